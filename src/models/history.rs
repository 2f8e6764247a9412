use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use super::task::TaskStatus;

/// One finished (or abandoned) analysis, as kept in the history store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Backend analysis identifier.
    pub analysis_id: String,
    /// Ticker that was analyzed.
    pub symbol: String,
    /// Terminal status of the run.
    pub status: TaskStatus,
    /// Canonical IDs of the agents that took part.
    pub agents: Vec<String>,
    /// Total tokens billed across all models.
    pub total_tokens: u64,
    /// Estimated cost in USD.
    pub total_cost_usd: f64,
    /// Final decision or summary line, if the backend sent one.
    pub summary: Option<String>,
    /// Error message for failed runs.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn duration_ms(&self) -> Option<u64> {
        let finished = self.finished_at?;
        (finished - self.started_at).num_milliseconds().try_into().ok()
    }
}
