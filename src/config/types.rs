use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::agents::registry::{default_team, AgentRole};
use crate::errors::MarketdeskError;
use crate::pipeline::agent_tracker::{DEFAULT_STARVATION_THRESHOLD, DEFAULT_STARVATION_TICK};
use crate::pipeline::dedup::DEFAULT_DEDUP_WINDOW;
use crate::pipeline::render_log::DEFAULT_RENDER_WINDOW;
use crate::pipeline::SessionConfig;
use crate::stores::cost::{default_pricing, ModelPricing};
use crate::transport::poller::DEFAULT_POLL_INTERVAL;
use crate::transport::ws::{WsConfig, DEFAULT_RECONNECT_DELAY};

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_SYMBOL: &str = "AAPL";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MarketdeskConfig {
    pub backend: Option<BackendConfig>,
    pub pipeline: Option<PipelineConfig>,
    pub analysis: Option<AnalysisConfig>,
    pub pricing: Option<HashMap<String, ModelPricing>>,
    pub history: Option<HistoryConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct BackendConfig {
    pub ws_url: Option<String>,
    pub api_url: Option<String>,
    pub reconnect_delay_secs: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct PipelineConfig {
    pub dedup_window_secs: Option<u64>,
    pub starvation_tick_secs: Option<u64>,
    pub starvation_threshold_secs: Option<u64>,
    pub render_window: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AnalysisConfig {
    pub symbol: Option<String>,
    pub agents: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HistoryConfig {
    pub db_path: Option<String>,
}

impl MarketdeskConfig {
    fn backend(&self) -> BackendConfig {
        self.backend.clone().unwrap_or_default()
    }

    fn pipeline(&self) -> PipelineConfig {
        self.pipeline.clone().unwrap_or_default()
    }

    pub fn ws_config(&self) -> WsConfig {
        let backend = self.backend();
        WsConfig {
            url: backend.ws_url.unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            reconnect_delay: backend
                .reconnect_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RECONNECT_DELAY),
            max_reconnect_attempts: backend.max_reconnect_attempts,
        }
    }

    pub fn api_url(&self) -> String {
        self.backend().api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        self.backend()
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn starvation_tick(&self) -> Duration {
        self.pipeline()
            .starvation_tick_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STARVATION_TICK)
    }

    pub fn symbol(&self) -> String {
        self.analysis
            .as_ref()
            .and_then(|a| a.symbol.clone())
            .unwrap_or_else(|| DEFAULT_SYMBOL.to_string())
            .to_uppercase()
    }

    /// Configured team in execution order; unknown names are dropped here
    /// and reported by validation.
    pub fn team(&self) -> Vec<AgentRole> {
        match self.analysis.as_ref().and_then(|a| a.agents.as_ref()) {
            Some(names) if !names.is_empty() => {
                let mut team: Vec<AgentRole> = names.iter().filter_map(|n| AgentRole::normalize(n)).collect();
                team.sort();
                team.dedup();
                team
            }
            _ => default_team(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let pipeline = self.pipeline();
        SessionConfig {
            dedup_window: pipeline
                .dedup_window_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DEDUP_WINDOW),
            starvation_threshold: pipeline
                .starvation_threshold_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_STARVATION_THRESHOLD),
            render_window: pipeline.render_window.unwrap_or(DEFAULT_RENDER_WINDOW),
            team: self.team(),
        }
    }

    /// Built-in table overlaid with configured prices.
    pub fn pricing_table(&self) -> HashMap<String, ModelPricing> {
        let mut table = default_pricing();
        if let Some(custom) = &self.pricing {
            table.extend(custom.iter().map(|(k, v)| (k.clone(), *v)));
        }
        table
    }

    /// Apply command-line overrides for the analysis section. Unknown agent
    /// names are rejected here rather than silently dropped.
    pub fn with_analysis(mut self, symbol: Option<&str>, agents: Vec<String>) -> Result<Self, MarketdeskError> {
        let unknown: Vec<&str> = agents
            .iter()
            .filter(|name| AgentRole::normalize(name).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(MarketdeskError::Config(format!("Unknown agents: {}", unknown.join(", "))));
        }
        let analysis = self.analysis.get_or_insert_with(AnalysisConfig::default);
        if let Some(symbol) = symbol.map(str::trim).filter(|s| !s.is_empty()) {
            analysis.symbol = Some(symbol.to_string());
        }
        if !agents.is_empty() {
            analysis.agents = Some(agents);
        }
        Ok(self)
    }

    /// Team as wire names for subscribe frames and task requests.
    pub fn team_names(&self) -> Vec<String> {
        self.team().iter().map(|role| role.as_str().to_string()).collect()
    }

    pub fn db_path(&self) -> PathBuf {
        match self.history.as_ref().and_then(|h| h.db_path.as_ref()) {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(".marketdesk").join("history.db"),
        }
    }
}
