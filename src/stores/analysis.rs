use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use crate::agents::registry::AgentRole;
use crate::events::{AgentStatus, InboundEvent};
use crate::models::{HistoryEntry, TaskStatus};
use super::cost::CostLedger;

/// Projection of the raw event stream onto "how far along is this analysis".
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisState {
    pub analysis_id: String,
    pub symbol: String,
    pub status: TaskStatus,
    pub analyzing: bool,
    /// 0 to 100.
    pub progress: f64,
    pub current_step: Option<String>,
    pub agent_states: BTreeMap<AgentRole, AgentStatus>,
    pub summary: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub struct AnalysisStore {
    team: Vec<AgentRole>,
    state: AnalysisState,
}

impl AnalysisStore {
    pub fn start(analysis_id: impl Into<String>, symbol: impl Into<String>, team: Vec<AgentRole>) -> Self {
        let agent_states = team.iter().map(|r| (*r, AgentStatus::Idle)).collect();
        Self {
            team,
            state: AnalysisState {
                analysis_id: analysis_id.into(),
                symbol: symbol.into(),
                status: TaskStatus::Running,
                analyzing: true,
                progress: 0.0,
                current_step: None,
                agent_states,
                summary: None,
                error: None,
                started_at: Utc::now(),
                finished_at: None,
            },
        }
    }

    pub fn state(&self) -> &AnalysisState {
        &self.state
    }

    pub fn apply(&mut self, event: &InboundEvent) {
        if !self.state.analyzing {
            return;
        }
        match event {
            InboundEvent::Status(status) => {
                let role = match AgentRole::normalize(&status.agent) {
                    Some(role) => role,
                    None => return,
                };
                let previous = self.state.agent_states.insert(role, status.status);
                // never walk a finished agent backwards on a late event
                if previous == Some(AgentStatus::Completed) && status.status != AgentStatus::Completed {
                    self.state.agent_states.insert(role, AgentStatus::Completed);
                }
                match status.status {
                    AgentStatus::Processing => {
                        self.state.current_step = Some(format!("{} is working", role.display_name()));
                    }
                    AgentStatus::Completed => {
                        self.state.current_step = None;
                    }
                    AgentStatus::Idle => {}
                }
                self.recompute_progress();
            }
            InboundEvent::Complete(complete) => {
                debug!(analysis_id = %complete.analysis_id, "Analysis store finalizing");
                self.state.summary = complete.result.as_ref().and_then(extract_summary);
                self.finish(TaskStatus::Completed);
                self.state.progress = 100.0;
            }
            InboundEvent::Error(error) => {
                self.state.error = Some(error.message.clone());
                self.finish(TaskStatus::Failed);
            }
            InboundEvent::Thought(_) | InboundEvent::Tool(_) => {}
        }
    }

    pub fn cancel(&mut self) {
        if self.state.analyzing {
            self.finish(TaskStatus::Cancelled);
        }
    }

    pub fn to_history_entry(&self, ledger: &CostLedger) -> HistoryEntry {
        let totals = ledger.totals();
        HistoryEntry {
            analysis_id: self.state.analysis_id.clone(),
            symbol: self.state.symbol.clone(),
            status: self.state.status,
            agents: self.team.iter().map(|r| r.as_str().to_string()).collect(),
            total_tokens: totals.total_tokens(),
            total_cost_usd: totals.cost_usd,
            summary: self.state.summary.clone(),
            error: self.state.error.clone(),
            started_at: self.state.started_at,
            finished_at: self.state.finished_at,
        }
    }

    fn finish(&mut self, status: TaskStatus) {
        self.state.status = status;
        self.state.analyzing = false;
        self.state.current_step = None;
        self.state.finished_at = Some(Utc::now());
    }

    fn recompute_progress(&mut self) {
        if self.team.is_empty() {
            return;
        }
        let done = self
            .state
            .agent_states
            .iter()
            .filter(|(role, status)| self.team.contains(*role) && **status == AgentStatus::Completed)
            .count();
        let progress = done as f64 / self.team.len() as f64 * 100.0;
        // 100% is reserved for the backend's completion event
        self.state.progress = progress.min(99.0).max(self.state.progress);
    }
}

/// Pull a one-line decision out of the backend's result payload.
fn extract_summary(result: &serde_json::Value) -> Option<String> {
    if let Some(text) = result.as_str() {
        return Some(text.to_string());
    }
    ["decision", "final_trade_decision", "summary", "recommendation"]
        .iter()
        .find_map(|key| result.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CompleteEvent, ErrorEvent, StatusEvent};
    use serde_json::json;

    fn status(agent: &str, status: AgentStatus) -> InboundEvent {
        InboundEvent::Status(StatusEvent {
            agent: agent.into(),
            status,
            phase: None,
            usage: None,
            timestamp: None,
        })
    }

    fn team() -> Vec<AgentRole> {
        vec![AgentRole::MarketAnalyst, AgentRole::Trader, AgentRole::RiskManager, AgentRole::NewsAnalyst]
    }

    #[test]
    fn test_progress_follows_completed_agents() {
        let mut store = AnalysisStore::start("a-1", "AAPL", team());
        store.apply(&status("market_analyst", AgentStatus::Processing));
        assert_eq!(store.state().progress, 0.0);
        assert_eq!(store.state().current_step.as_deref(), Some("Market Analyst is working"));
        store.apply(&status("market_analyst", AgentStatus::Completed));
        assert_eq!(store.state().progress, 25.0);
        store.apply(&status("Trader", AgentStatus::Completed));
        assert_eq!(store.state().progress, 50.0);
    }

    #[test]
    fn test_progress_never_regresses() {
        let mut store = AnalysisStore::start("a-1", "AAPL", team());
        store.apply(&status("trader", AgentStatus::Completed));
        store.apply(&status("trader", AgentStatus::Processing));
        assert_eq!(store.state().agent_states[&AgentRole::Trader], AgentStatus::Completed);
        assert_eq!(store.state().progress, 25.0);
    }

    #[test]
    fn test_complete_sets_summary_and_full_progress() {
        let mut store = AnalysisStore::start("a-1", "AAPL", team());
        store.apply(&InboundEvent::Complete(CompleteEvent {
            analysis_id: "a-1".into(),
            result: Some(json!({"decision": "BUY"})),
            usage: None,
        }));
        let state = store.state();
        assert_eq!(state.progress, 100.0);
        assert!(!state.analyzing);
        assert_eq!(state.status, TaskStatus::Completed);
        assert_eq!(state.summary.as_deref(), Some("BUY"));
    }

    #[test]
    fn test_error_stops_analyzing_and_ignores_later_events() {
        let mut store = AnalysisStore::start("a-1", "AAPL", team());
        store.apply(&status("market_analyst", AgentStatus::Completed));
        store.apply(&InboundEvent::Error(ErrorEvent { message: "rate limited".into() }));
        store.apply(&status("trader", AgentStatus::Completed));
        let state = store.state();
        assert!(!state.analyzing);
        assert_eq!(state.status, TaskStatus::Failed);
        assert_eq!(state.error.as_deref(), Some("rate limited"));
        assert_eq!(state.progress, 25.0);
    }

    #[test]
    fn test_history_entry_from_state() {
        let mut store = AnalysisStore::start("a-9", "MSFT", vec![AgentRole::Trader]);
        store.cancel();
        let entry = store.to_history_entry(&CostLedger::default());
        assert_eq!(entry.status, TaskStatus::Cancelled);
        assert_eq!(entry.agents, vec!["trader".to_string()]);
        assert!(entry.finished_at.is_some());
    }
}
