use serde::{Deserialize, Serialize};
use crate::events::AgentStatus;

/// Lifecycle of a backend analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[serde(alias = "queued")]
    Pending,
    #[serde(alias = "processing")]
    Running,
    Completed,
    #[serde(alias = "error")]
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent progress as reported by the task status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProgress {
    /// Agent name in whatever variant the backend uses.
    #[serde(alias = "agent")]
    pub name: String,
    /// Current status of the agent.
    pub status: AgentStatus,
}

/// Response body of `GET /api/tasks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub status: TaskStatus,
    /// Completion percentage, 0 to 100.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub agents: Vec<AgentProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /api/tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub symbol: String,
    #[serde(default)]
    pub agents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_parses_backend_shape() {
        let raw = r#"{"id":"t-1","status":"queued","progress":12.5,
            "agents":[{"agent":"Market Analyst","status":"completed"},{"name":"news","status":"processing"}],
            "current_step":"Analyzing news"}"#;
        let snap: TaskSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snap.status, TaskStatus::Pending);
        assert_eq!(snap.agents.len(), 2);
        assert_eq!(snap.agents[0].status, AgentStatus::Completed);
        assert_eq!(snap.current_step.as_deref(), Some("Analyzing news"));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }
}
