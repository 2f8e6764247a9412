use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use crate::errors::MarketdeskError;
use crate::models::{HistoryEntry, TaskStatus};
use crate::stores::cost::ModelUsage;
use super::Database;

const SELECT_COLUMNS: &str = "SELECT id, symbol, status, agents, total_tokens, total_cost_usd, summary, error_message, started_at, finished_at FROM analyses";

impl Database {
    /// Insert or replace a finished analysis and its per-model usage.
    pub fn save_history(
        &self,
        entry: &HistoryEntry,
        usage: &BTreeMap<String, ModelUsage>,
    ) -> Result<(), MarketdeskError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()
            .map_err(|e| MarketdeskError::Database(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT OR REPLACE INTO analyses (id, symbol, status, agents, total_tokens, total_cost_usd, summary, error_message, started_at, finished_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                entry.analysis_id,
                entry.symbol,
                entry.status.as_str(),
                serde_json::to_string(&entry.agents)?,
                entry.total_tokens as i64,
                entry.total_cost_usd,
                entry.summary,
                entry.error,
                entry.started_at.to_rfc3339(),
                entry.finished_at.map(|t| t.to_rfc3339()),
            ],
        ).map_err(|e| MarketdeskError::Database(format!("Failed to save analysis: {}", e)))?;

        tx.execute("DELETE FROM model_usage WHERE analysis_id = ?1", rusqlite::params![entry.analysis_id])
            .map_err(|e| MarketdeskError::Database(format!("Failed to clear usage: {}", e)))?;
        for (model, u) in usage {
            tx.execute(
                "INSERT INTO model_usage (analysis_id, model, calls, prompt_tokens, completion_tokens, cost_usd) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    entry.analysis_id,
                    model,
                    u.calls as i64,
                    u.prompt_tokens as i64,
                    u.completion_tokens as i64,
                    u.cost_usd,
                ],
            ).map_err(|e| MarketdeskError::Database(format!("Failed to save usage: {}", e)))?;
        }

        tx.commit()
            .map_err(|e| MarketdeskError::Database(format!("Commit failed: {}", e)))?;
        Ok(())
    }

    pub fn get_history(&self, analysis_id: &str) -> Result<Option<HistoryEntry>, MarketdeskError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .map_err(|e| MarketdeskError::Database(format!("Query failed: {}", e)))?;

        match stmt.query_row(rusqlite::params![analysis_id], read_row) {
            Ok(raw) => Ok(Some(raw.into_entry()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(MarketdeskError::Database(format!("Query error: {}", e))),
        }
    }

    /// Most recent first, optionally filtered by symbol.
    pub fn list_history(&self, symbol: Option<&str>, limit: usize) -> Result<Vec<HistoryEntry>, MarketdeskError> {
        let conn = self.conn.lock().unwrap();
        let symbol = symbol.map(|s| s.to_uppercase());
        let sql = format!(
            "{} WHERE (?1 IS NULL OR symbol = ?1) ORDER BY started_at DESC LIMIT ?2",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)
            .map_err(|e| MarketdeskError::Database(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params![symbol, limit as i64], read_row)
            .map_err(|e| MarketdeskError::Database(format!("Query error: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| MarketdeskError::Database(format!("Row error: {}", e)))?;
            entries.push(raw.into_entry()?);
        }
        Ok(entries)
    }

    pub fn get_model_usage(&self, analysis_id: &str) -> Result<BTreeMap<String, ModelUsage>, MarketdeskError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT model, calls, prompt_tokens, completion_tokens, cost_usd FROM model_usage WHERE analysis_id = ?1"
        ).map_err(|e| MarketdeskError::Database(format!("Query failed: {}", e)))?;

        let rows = stmt.query_map(rusqlite::params![analysis_id], |row: &rusqlite::Row| {
            Ok((
                row.get::<_, String>(0)?,
                ModelUsage {
                    calls: row.get::<_, i64>(1)? as u64,
                    prompt_tokens: row.get::<_, i64>(2)? as u64,
                    completion_tokens: row.get::<_, i64>(3)? as u64,
                    cost_usd: row.get(4)?,
                },
            ))
        }).map_err(|e| MarketdeskError::Database(format!("Query error: {}", e)))?;

        let mut usage = BTreeMap::new();
        for row in rows {
            let (model, u) = row.map_err(|e| MarketdeskError::Database(format!("Row error: {}", e)))?;
            usage.insert(model, u);
        }
        Ok(usage)
    }

    pub fn delete_history(&self, analysis_id: &str) -> Result<bool, MarketdeskError> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM analyses WHERE id = ?1", rusqlite::params![analysis_id])
            .map_err(|e| MarketdeskError::Database(format!("Delete failed: {}", e)))?;
        Ok(deleted > 0)
    }
}

struct RawRow {
    id: String,
    symbol: String,
    status: String,
    agents: String,
    total_tokens: i64,
    total_cost_usd: f64,
    summary: Option<String>,
    error: Option<String>,
    started_at: String,
    finished_at: Option<String>,
}

fn read_row(row: &rusqlite::Row) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        symbol: row.get(1)?,
        status: row.get(2)?,
        agents: row.get(3)?,
        total_tokens: row.get(4)?,
        total_cost_usd: row.get(5)?,
        summary: row.get(6)?,
        error: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
    })
}

impl RawRow {
    fn into_entry(self) -> Result<HistoryEntry, MarketdeskError> {
        let status: TaskStatus = serde_json::from_value(serde_json::Value::String(self.status))?;
        Ok(HistoryEntry {
            analysis_id: self.id,
            symbol: self.symbol,
            status,
            agents: serde_json::from_str(&self.agents)?,
            total_tokens: self.total_tokens.max(0) as u64,
            total_cost_usd: self.total_cost_usd,
            summary: self.summary,
            error: self.error,
            started_at: parse_time(&self.started_at)?,
            finished_at: self.finished_at.as_deref().map(parse_time).transpose()?,
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, MarketdeskError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| MarketdeskError::Database(format!("Bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(id: &str, symbol: &str, minutes_ago: i64) -> HistoryEntry {
        let started = Utc::now() - Duration::minutes(minutes_ago);
        HistoryEntry {
            analysis_id: id.into(),
            symbol: symbol.into(),
            status: TaskStatus::Completed,
            agents: vec!["market_analyst".into(), "trader".into()],
            total_tokens: 4200,
            total_cost_usd: 0.021,
            summary: Some("BUY".into()),
            error: None,
            started_at: started,
            finished_at: Some(started + Duration::seconds(90)),
        }
    }

    #[test]
    fn test_history_round_trip() {
        let db = Database::in_memory().unwrap();
        let mut usage = BTreeMap::new();
        usage.insert("gpt-4o".to_string(), ModelUsage {
            calls: 3,
            prompt_tokens: 3000,
            completion_tokens: 1200,
            cost_usd: 0.021,
        });
        let saved = entry("a-1", "AAPL", 5);
        db.save_history(&saved, &usage).unwrap();

        let loaded = db.get_history("a-1").unwrap().unwrap();
        assert_eq!(loaded.symbol, "AAPL");
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.agents, saved.agents);
        assert_eq!(loaded.summary.as_deref(), Some("BUY"));
        assert_eq!(loaded.duration_ms(), Some(90_000));
        assert_eq!(db.get_model_usage("a-1").unwrap()["gpt-4o"].calls, 3);
    }

    #[test]
    fn test_list_newest_first_with_filter() {
        let db = Database::in_memory().unwrap();
        db.save_history(&entry("old", "AAPL", 60), &BTreeMap::new()).unwrap();
        db.save_history(&entry("new", "AAPL", 1), &BTreeMap::new()).unwrap();
        db.save_history(&entry("other", "MSFT", 2), &BTreeMap::new()).unwrap();

        let all = db.list_history(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].analysis_id, "new");

        let aapl = db.list_history(Some("aapl"), 10).unwrap();
        let ids: Vec<_> = aapl.iter().map(|e| e.analysis_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert_eq!(db.list_history(None, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_cascades_usage() {
        let db = Database::in_memory().unwrap();
        let mut usage = BTreeMap::new();
        usage.insert("qwen-plus".to_string(), ModelUsage::default());
        db.save_history(&entry("a-2", "NVDA", 3), &usage).unwrap();

        assert!(db.delete_history("a-2").unwrap());
        assert!(!db.delete_history("a-2").unwrap());
        assert!(db.get_history("a-2").unwrap().is_none());
        assert!(db.get_model_usage("a-2").unwrap().is_empty());
    }

    #[test]
    fn test_missing_entry_is_none() {
        let db = Database::in_memory().unwrap();
        assert!(db.get_history("nope").unwrap().is_none());
    }
}
