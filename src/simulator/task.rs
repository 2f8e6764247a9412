use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::agents::registry::AgentRole;
use crate::events::{ErrorEvent, InboundEvent};
use crate::models::{AgentProgress, TaskSnapshot, TaskStatus};
use crate::stores::AnalysisStore;

const LIVE_CAPACITY: usize = 256;

/// One simulated analysis. Frames are kept so late subscribers can catch
/// up; `live` carries `(index, frame)` so a subscriber can skip frames it
/// already replayed.
pub struct SimTask {
    pub id: String,
    pub symbol: String,
    started: AtomicBool,
    store: RwLock<AnalysisStore>,
    result: RwLock<Option<serde_json::Value>>,
    frames: RwLock<Vec<String>>,
    live: broadcast::Sender<(usize, String)>,
    cancel_token: CancellationToken,
}

impl SimTask {
    pub fn new(id: impl Into<String>, symbol: impl Into<String>, team: Vec<AgentRole>) -> Self {
        let id = id.into();
        let symbol = symbol.into();
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            store: RwLock::new(AnalysisStore::start(id.clone(), symbol.clone(), team)),
            id,
            symbol,
            started: AtomicBool::new(false),
            result: RwLock::new(None),
            frames: RwLock::new(Vec::new()),
            live,
            cancel_token: CancellationToken::new(),
        }
    }

    pub async fn snapshot(&self) -> TaskSnapshot {
        let store = self.store.read().await;
        let state = store.state();
        let status = if self.started.load(Ordering::SeqCst) {
            state.status
        } else if state.status == TaskStatus::Cancelled {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Pending
        };
        TaskSnapshot {
            id: self.id.clone(),
            status,
            progress: state.progress,
            agents: state
                .agent_states
                .iter()
                .map(|(role, status)| AgentProgress {
                    name: role.as_str().to_string(),
                    status: *status,
                })
                .collect(),
            current_step: state.current_step.clone(),
            error: state.error.clone(),
        }
    }

    pub async fn result(&self) -> Option<serde_json::Value> {
        self.result.read().await.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Subscribe, then take the backlog. Live frames with an index below
    /// the returned backlog length are already in the backlog.
    pub async fn attach(&self) -> (Vec<String>, broadcast::Receiver<(usize, String)>) {
        let live = self.live.subscribe();
        let backlog = self.frames.read().await.clone();
        (backlog, live)
    }

    async fn publish(&self, event: &InboundEvent) {
        let frame = match serde_json::to_string(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(task_id = %self.id, error = %e, "Frame serialization failed");
                return;
            }
        };
        let mut frames = self.frames.write().await;
        let index = frames.len();
        frames.push(frame.clone());
        let _ = self.live.send((index, frame));
    }

    async fn apply(&self, event: &InboundEvent) {
        self.store.write().await.apply(event);
        if let InboundEvent::Complete(complete) = event {
            *self.result.write().await = complete.result.clone();
        }
    }
}

/// Play `script` for `task` once a run slot frees up, one frame every
/// `step_delay`.
pub async fn play(task: Arc<SimTask>, script: Vec<InboundEvent>, step_delay: Duration, slots: Arc<Semaphore>) {
    let _permit = tokio::select! {
        biased;
        _ = task.cancel_token.cancelled() => {
            task.store.write().await.cancel();
            info!(task_id = %task.id, "Task cancelled before start");
            return;
        }
        permit = slots.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
    };
    task.started.store(true, Ordering::SeqCst);
    info!(task_id = %task.id, symbol = %task.symbol, frames = script.len(), "Simulated analysis started");

    for event in script {
        tokio::select! {
            _ = task.cancel_token.cancelled() => {
                let cancelled = InboundEvent::Error(ErrorEvent { message: "Analysis cancelled".into() });
                task.publish(&cancelled).await;
                task.store.write().await.cancel();
                info!(task_id = %task.id, "Simulated analysis cancelled");
                return;
            }
            _ = tokio::time::sleep(step_delay) => {}
        }
        task.apply(&event).await;
        task.publish(&event).await;
        debug!(task_id = %task.id, event_type = event.type_tag(), "Frame sent");
    }
    info!(task_id = %task.id, "Simulated analysis finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::script::{build_script, ScriptOptions};

    #[tokio::test]
    async fn test_play_to_completion() {
        let team = vec![AgentRole::MarketAnalyst, AgentRole::Trader];
        let task = Arc::new(SimTask::new("t-1", "AAPL", team.clone()));
        let script = build_script("t-1", "AAPL", &team, &ScriptOptions::orderly());
        let frames = script.len();

        play(task.clone(), script, Duration::ZERO, Arc::new(Semaphore::new(1))).await;

        let snapshot = task.snapshot().await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.progress, 100.0);
        assert!(task.result().await.is_some());
        let (backlog, _) = task.attach().await;
        assert_eq!(backlog.len(), frames);
    }

    #[tokio::test]
    async fn test_waits_for_slot() {
        let slots = Arc::new(Semaphore::new(0));
        let task = Arc::new(SimTask::new("t-2", "MSFT", vec![AgentRole::Trader]));
        let handle = tokio::spawn(play(task.clone(), Vec::new(), Duration::ZERO, slots));
        tokio::task::yield_now().await;
        assert_eq!(task.snapshot().await.status, TaskStatus::Pending);

        task.cancel();
        handle.await.unwrap();
        assert_eq!(task.snapshot().await.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_before_start_sends_nothing() {
        let team = vec![AgentRole::MarketAnalyst];
        let task = Arc::new(SimTask::new("t-3", "NVDA", team.clone()));
        let script = build_script("t-3", "NVDA", &team, &ScriptOptions::orderly());
        task.cancel();
        play(task.clone(), script, Duration::from_millis(5), Arc::new(Semaphore::new(1))).await;

        let (backlog, _) = task.attach().await;
        assert!(backlog.is_empty());
        assert_eq!(task.snapshot().await.status, TaskStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_run_publishes_error() {
        let team = vec![AgentRole::MarketAnalyst];
        let task = Arc::new(SimTask::new("t-4", "NVDA", team.clone()));
        let script = build_script("t-4", "NVDA", &team, &ScriptOptions::orderly());
        let handle = tokio::spawn(play(task.clone(), script, Duration::from_secs(10), Arc::new(Semaphore::new(1))));

        tokio::time::sleep(Duration::from_secs(25)).await;
        task.cancel();
        handle.await.unwrap();

        let (backlog, _) = task.attach().await;
        assert_eq!(backlog.len(), 3);
        assert!(backlog[2].contains("Analysis cancelled"));
        assert_eq!(task.snapshot().await.status, TaskStatus::Cancelled);
    }
}
