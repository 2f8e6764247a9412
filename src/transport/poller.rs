use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::agents::registry::{execution_index, AgentRole};
use crate::errors::MarketdeskError;
use crate::events::{
    AgentStatus, CompleteEvent, ErrorEvent, InboundEvent, StatusEvent, ThoughtEvent,
};
use crate::models::{TaskSnapshot, TaskStatus};
use super::rest::RestClient;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Turns successive task snapshots into the events the push stream would
/// have delivered.
#[derive(Debug, Default)]
pub struct SnapshotDiff {
    agents: HashMap<String, AgentStatus>,
    step: Option<String>,
    terminal: bool,
}

impl SnapshotDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Events implied by the change from the previous snapshot. Terminal
    /// snapshots yield `Complete` or `Error` last; the caller attaches the
    /// result payload.
    pub fn diff(&mut self, snapshot: &TaskSnapshot, result: Option<serde_json::Value>) -> Vec<InboundEvent> {
        if self.terminal {
            return Vec::new();
        }
        let mut events = Vec::new();

        // completions first so the tracker hands the floor on before the
        // next agent starts
        let mut changed: Vec<(String, AgentStatus)> = snapshot
            .agents
            .iter()
            .filter(|a| self.agents.get(&a.name) != Some(&a.status))
            .map(|a| (a.name.clone(), a.status))
            .collect();
        changed.sort_by_key(|(name, status)| {
            let rank = match status {
                AgentStatus::Completed => 0,
                AgentStatus::Processing => 1,
                AgentStatus::Idle => 2,
            };
            let order = AgentRole::normalize(name)
                .map(execution_index)
                .unwrap_or(usize::MAX);
            (rank, order)
        });
        for (name, status) in changed {
            self.agents.insert(name.clone(), status);
            if status == AgentStatus::Idle {
                continue;
            }
            events.push(InboundEvent::Status(StatusEvent {
                agent: name,
                status,
                phase: None,
                usage: None,
                timestamp: None,
            }));
        }

        let step = snapshot.current_step.clone().filter(|s| !s.trim().is_empty());
        if step.is_some() && step != self.step {
            if let Some(text) = &step {
                events.push(InboundEvent::Thought(ThoughtEvent {
                    agent: None,
                    thought: text.clone(),
                    phase: None,
                    phase_order: None,
                    node_order: None,
                    is_phase_complete: false,
                    is_tool: false,
                    timestamp: None,
                }));
            }
            self.step = step;
        }

        match snapshot.status {
            TaskStatus::Completed => {
                self.terminal = true;
                events.push(InboundEvent::Complete(CompleteEvent {
                    analysis_id: snapshot.id.clone(),
                    result,
                    usage: None,
                }));
            }
            TaskStatus::Failed | TaskStatus::Cancelled => {
                self.terminal = true;
                let message = snapshot
                    .error
                    .clone()
                    .unwrap_or_else(|| format!("Task {} {}", snapshot.id, snapshot.status));
                events.push(InboundEvent::Error(ErrorEvent { message }));
            }
            TaskStatus::Pending | TaskStatus::Running => {}
        }
        events
    }
}

/// Poll a task until it reaches a terminal state or `cancel_token` fires,
/// publishing derived events on `events`.
pub async fn poll_task(
    client: &RestClient,
    task_id: &str,
    interval: Duration,
    events: broadcast::Sender<InboundEvent>,
    cancel_token: CancellationToken,
) -> Result<TaskSnapshot, MarketdeskError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut diff = SnapshotDiff::new();

    info!(task_id, interval_ms = interval.as_millis() as u64, "Polling task");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                return Err(MarketdeskError::Transport("Polling cancelled".into()));
            }
            _ = ticker.tick() => {}
        }

        let snapshot = client.get_task(task_id).await?;
        debug!(task_id, status = %snapshot.status, progress = snapshot.progress, "Snapshot");

        let result = if snapshot.status == TaskStatus::Completed {
            match client.get_result(task_id).await {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(task_id, error = %e, "Result fetch failed, completing without it");
                    None
                }
            }
        } else {
            None
        };

        for event in diff.diff(&snapshot, result) {
            let _ = events.send(event);
        }
        if diff.is_terminal() {
            return Ok(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentProgress;
    use serde_json::json;

    fn snapshot(status: TaskStatus, agents: &[(&str, AgentStatus)], step: Option<&str>) -> TaskSnapshot {
        TaskSnapshot {
            id: "t-1".into(),
            status,
            progress: 0.0,
            agents: agents
                .iter()
                .map(|(name, status)| AgentProgress { name: name.to_string(), status: *status })
                .collect(),
            current_step: step.map(str::to_string),
            error: None,
        }
    }

    #[test]
    fn test_completion_reported_before_next_start() {
        let mut diff = SnapshotDiff::new();
        diff.diff(&snapshot(TaskStatus::Running, &[("market_analyst", AgentStatus::Processing)], None), None);
        let events = diff.diff(
            &snapshot(
                TaskStatus::Running,
                &[
                    ("social_analyst", AgentStatus::Processing),
                    ("market_analyst", AgentStatus::Completed),
                ],
                None,
            ),
            None,
        );
        let tags: Vec<_> = events
            .iter()
            .map(|e| match e {
                InboundEvent::Status(s) => (s.agent.as_str(), s.status),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            tags,
            vec![("market_analyst", AgentStatus::Completed), ("social_analyst", AgentStatus::Processing)]
        );
    }

    #[test]
    fn test_unchanged_snapshot_yields_nothing() {
        let mut diff = SnapshotDiff::new();
        let snap = snapshot(TaskStatus::Running, &[("trader", AgentStatus::Processing)], Some("Trading"));
        assert_eq!(diff.diff(&snap, None).len(), 2);
        assert!(diff.diff(&snap, None).is_empty());
    }

    #[test]
    fn test_step_change_becomes_system_thought() {
        let mut diff = SnapshotDiff::new();
        let events = diff.diff(&snapshot(TaskStatus::Running, &[], Some("Bull vs bear debate")), None);
        match &events[0] {
            InboundEvent::Thought(t) => {
                assert!(t.agent.is_none());
                assert_eq!(t.thought, "Bull vs bear debate");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_terminal_snapshot_completes_once() {
        let mut diff = SnapshotDiff::new();
        let events = diff.diff(&snapshot(TaskStatus::Completed, &[], None), Some(json!({"decision": "HOLD"})));
        match events.last() {
            Some(InboundEvent::Complete(c)) => assert_eq!(c.result, Some(json!({"decision": "HOLD"}))),
            other => panic!("unexpected {:?}", other),
        }
        assert!(diff.is_terminal());
        assert!(diff.diff(&snapshot(TaskStatus::Completed, &[], None), None).is_empty());
    }

    #[test]
    fn test_failed_snapshot_becomes_error() {
        let mut diff = SnapshotDiff::new();
        let mut snap = snapshot(TaskStatus::Failed, &[], None);
        snap.error = Some("quota exceeded".into());
        match diff.diff(&snap, None).last() {
            Some(InboundEvent::Error(e)) => assert_eq!(e.message, "quota exceeded"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
