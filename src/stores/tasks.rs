use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use crate::events::InboundEvent;
use crate::models::{TaskSnapshot, TaskStatus};

#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub symbol: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub current_step: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Client-side simulation of the backend's task queue: a bounded number of
/// tasks run at once, the rest wait in submission order.
#[derive(Debug)]
pub struct TaskQueue {
    capacity: usize,
    tasks: Vec<TaskRecord>,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tasks: Vec::new(),
        }
    }

    /// Add a task and return its 0-based position among waiting tasks, or
    /// `None` if it started running right away.
    pub fn submit(&mut self, id: impl Into<String>, symbol: impl Into<String>) -> Option<usize> {
        let id = id.into();
        self.tasks.push(TaskRecord {
            id: id.clone(),
            symbol: symbol.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            current_step: None,
            submitted_at: Utc::now(),
        });
        self.promote();
        self.position(&id)
    }

    pub fn get(&self, id: &str) -> Option<&TaskRecord> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.pending().position(|t| t.id == id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Pending)
    }

    pub fn running(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status == TaskStatus::Running)
    }

    pub fn finished(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.iter().filter(|t| t.status.is_terminal())
    }

    /// Reconcile with an authoritative snapshot from the REST API.
    pub fn update(&mut self, snapshot: &TaskSnapshot) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == snapshot.id) {
            task.status = snapshot.status;
            task.progress = snapshot.progress.clamp(0.0, 100.0);
            task.current_step = snapshot.current_step.clone();
        } else {
            debug!(task_id = %snapshot.id, "Snapshot for untracked task ignored");
            return;
        }
        self.promote();
    }

    /// Track a task through the push stream.
    pub fn apply(&mut self, task_id: &str, event: &InboundEvent) {
        let status = match event {
            InboundEvent::Complete(_) => TaskStatus::Completed,
            InboundEvent::Error(_) => TaskStatus::Failed,
            InboundEvent::Status(_) | InboundEvent::Thought(_) | InboundEvent::Tool(_) => TaskStatus::Running,
        };
        self.set_status(task_id, status);
    }

    pub fn cancel(&mut self, id: &str) -> bool {
        let cancelled = match self.tasks.iter_mut().find(|t| t.id == id && !t.status.is_terminal()) {
            Some(task) => {
                task.status = TaskStatus::Cancelled;
                true
            }
            None => false,
        };
        if cancelled {
            self.promote();
        }
        cancelled
    }

    fn set_status(&mut self, id: &str, status: TaskStatus) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            if task.status.is_terminal() || task.status == status {
                return;
            }
            task.status = status;
            if status == TaskStatus::Completed {
                task.progress = 100.0;
            }
        }
        self.promote();
    }

    fn promote(&mut self) {
        let mut running = self.running().count();
        for task in self.tasks.iter_mut() {
            if running >= self.capacity {
                break;
            }
            if task.status == TaskStatus::Pending {
                info!(task_id = %task.id, symbol = %task.symbol, "Task started");
                task.status = TaskStatus::Running;
                running += 1;
            }
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(1)
    }
}
