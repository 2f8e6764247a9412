use std::collections::{BTreeMap, HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::agents::registry::AgentRole;
use crate::events::{InboundEvent, TokenUsage};

/// USD per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl ModelPricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        usage.prompt_tokens as f64 / 1000.0 * self.prompt_per_1k
            + usage.completion_tokens as f64 / 1000.0 * self.completion_per_1k
    }
}

pub fn default_pricing() -> HashMap<String, ModelPricing> {
    let mut table = HashMap::new();
    table.insert("gpt-4o".to_string(), ModelPricing { prompt_per_1k: 0.0025, completion_per_1k: 0.01 });
    table.insert("gpt-4o-mini".to_string(), ModelPricing { prompt_per_1k: 0.00015, completion_per_1k: 0.0006 });
    table.insert("deepseek-chat".to_string(), ModelPricing { prompt_per_1k: 0.00027, completion_per_1k: 0.0011 });
    table.insert("qwen-plus".to_string(), ModelPricing { prompt_per_1k: 0.0004, completion_per_1k: 0.0012 });
    table
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
}

impl LedgerTotals {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Token and cost bookkeeping for one analysis.
///
/// Per-agent usage arrives on `agent.status` events. A usage block on
/// `analysis.complete` is treated as the run total and only counted when no
/// per-agent usage was seen, so the two reporting styles never double count.
/// A usage report delivered twice is counted once.
#[derive(Debug, Default)]
pub struct CostLedger {
    pricing: HashMap<String, ModelPricing>,
    per_model: BTreeMap<String, ModelUsage>,
    per_agent: BTreeMap<String, u64>,
    seen: HashSet<String>,
}

impl CostLedger {
    pub fn new(pricing: HashMap<String, ModelPricing>) -> Self {
        Self {
            pricing,
            per_model: BTreeMap::new(),
            per_agent: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    pub fn apply(&mut self, event: &InboundEvent) {
        match event {
            InboundEvent::Status(status) => {
                if let Some(usage) = &status.usage {
                    let agent = AgentRole::normalize(&status.agent)
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_else(|| status.agent.clone());
                    let key = format!(
                        "{}|{}|{}|{}",
                        agent, usage.model, usage.prompt_tokens, usage.completion_tokens
                    );
                    if !self.seen.insert(key) {
                        debug!(agent = %agent, "Repeated usage report ignored");
                        return;
                    }
                    self.record(Some(&agent), usage);
                }
            }
            InboundEvent::Complete(complete) => {
                if let Some(usage) = &complete.usage {
                    if self.per_model.is_empty() {
                        self.record(None, usage);
                    }
                }
            }
            _ => {}
        }
    }

    pub fn record(&mut self, agent: Option<&str>, usage: &TokenUsage) {
        let cost = match self.pricing.get(&usage.model) {
            Some(price) => price.cost(usage),
            None => {
                debug!(model = %usage.model, "No pricing for model, counting tokens only");
                0.0
            }
        };
        let entry = self.per_model.entry(usage.model.clone()).or_default();
        entry.calls += 1;
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.cost_usd += cost;

        if let Some(agent) = agent {
            *self.per_agent.entry(agent.to_string()).or_insert(0) += usage.total();
        }
    }

    pub fn per_model(&self) -> &BTreeMap<String, ModelUsage> {
        &self.per_model
    }

    pub fn per_agent(&self) -> &BTreeMap<String, u64> {
        &self.per_agent
    }

    pub fn totals(&self) -> LedgerTotals {
        self.per_model.values().fold(LedgerTotals::default(), |mut acc, m| {
            acc.prompt_tokens += m.prompt_tokens;
            acc.completion_tokens += m.completion_tokens;
            acc.cost_usd += m.cost_usd;
            acc
        })
    }
}
