use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;
use crate::agents::registry::AgentRole;
use crate::events::{
    AgentStatus, CompleteEvent, InboundEvent, StatusEvent, ThoughtEvent, TokenUsage, ToolEvent,
};

const SIMULATED_MODEL: &str = "gpt-4o-mini";

/// How badly the simulated backend mangles delivery order.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Frames may move up to this many positions from their natural slot.
    pub shuffle_window: usize,
    /// Probability that a frame is delivered twice.
    pub duplicate_rate: f64,
    /// Fixed seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            shuffle_window: 3,
            duplicate_rate: 0.15,
            seed: None,
        }
    }
}

impl ScriptOptions {
    /// Deliver frames exactly once, in order.
    pub fn orderly() -> Self {
        Self {
            shuffle_window: 0,
            duplicate_rate: 0.0,
            seed: Some(0),
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// The full event sequence for one analysis in delivery order. The
/// terminal `analysis.complete` is always last.
pub fn build_script(analysis_id: &str, symbol: &str, team: &[AgentRole], options: &ScriptOptions) -> Vec<InboundEvent> {
    let mut rng = options.rng();
    let mut events = natural_order(analysis_id, symbol, team, &mut rng);
    let terminal = events.pop();
    scramble(&mut events, options, &mut rng);
    events.extend(terminal);
    events
}

fn natural_order(analysis_id: &str, symbol: &str, team: &[AgentRole], rng: &mut StdRng) -> Vec<InboundEvent> {
    let mut team = team.to_vec();
    team.sort();
    team.dedup();

    let mut events = Vec::new();
    events.push(thought(None, format!("Starting analysis of {}", symbol), None, None, false));

    let mut node = 0u32;
    let mut phase = 0u32;
    for (i, role) in team.iter().enumerate() {
        let order = role.phase().order();
        if order != phase {
            phase = order;
            node = 0;
        }
        events.push(status(*role, AgentStatus::Processing, None));
        for line in agent_lines(*role, symbol) {
            node += 1;
            events.push(thought(Some(*role), line, Some(order), Some(node), false));
        }
        if let Some(tool_name) = agent_tool(*role) {
            node += 1;
            events.push(InboundEvent::Tool(ToolEvent {
                agent: Some(role.as_str().to_string()),
                tool: tool_name.to_string(),
                args: Some(json!({ "symbol": symbol })),
                message: None,
                phase: None,
                phase_order: Some(order),
                node_order: Some(node),
                timestamp: None,
            }));
        }

        let usage = TokenUsage {
            model: SIMULATED_MODEL.to_string(),
            prompt_tokens: 600 + rng.gen_range(0..900),
            completion_tokens: 200 + rng.gen_range(0..400),
        };
        events.push(status(*role, AgentStatus::Completed, Some(usage)));

        let last_in_phase = team.get(i + 1).map_or(true, |next| next.phase().order() != order);
        if last_in_phase {
            node += 1;
            events.push(thought(Some(*role), String::new(), Some(order), Some(node), true));
        }
    }

    let decision = ["BUY", "HOLD", "SELL"][rng.gen_range(0..3)];
    events.push(InboundEvent::Complete(CompleteEvent {
        analysis_id: analysis_id.to_string(),
        result: Some(json!({
            "symbol": symbol,
            "decision": decision,
            "confidence": (rng.gen_range(55..95) as f64) / 100.0,
        })),
        usage: None,
    }));
    events
}

/// Local shuffle plus occasional duplicates. Every frame stays within
/// `shuffle_window` positions of where it started.
fn scramble(events: &mut Vec<InboundEvent>, options: &ScriptOptions, rng: &mut StdRng) {
    if options.shuffle_window > 0 {
        for chunk in events.chunks_mut(options.shuffle_window + 1) {
            chunk.shuffle(rng);
        }
    }
    if options.duplicate_rate > 0.0 {
        let rate = options.duplicate_rate.clamp(0.0, 1.0);
        let mut out = Vec::with_capacity(events.len() * 2);
        for event in events.drain(..) {
            let dup = rng.gen_bool(rate);
            out.push(event.clone());
            if dup {
                out.push(event);
            }
        }
        *events = out;
    }
}

fn status(role: AgentRole, status: AgentStatus, usage: Option<TokenUsage>) -> InboundEvent {
    InboundEvent::Status(StatusEvent {
        agent: role.as_str().to_string(),
        status,
        phase: None,
        usage,
        timestamp: None,
    })
}

fn thought(
    role: Option<AgentRole>,
    text: String,
    phase_order: Option<u32>,
    node_order: Option<u32>,
    is_phase_complete: bool,
) -> InboundEvent {
    InboundEvent::Thought(ThoughtEvent {
        agent: role.map(|r| r.as_str().to_string()),
        thought: text,
        phase: None,
        phase_order,
        node_order,
        is_phase_complete,
        is_tool: false,
        timestamp: None,
    })
}

fn agent_tool(role: AgentRole) -> Option<&'static str> {
    match role {
        AgentRole::MarketAnalyst => Some("get_stock_data"),
        AgentRole::SocialAnalyst => Some("get_reddit_sentiment"),
        AgentRole::NewsAnalyst => Some("get_global_news"),
        AgentRole::FundamentalsAnalyst => Some("get_financial_statements"),
        _ => None,
    }
}

fn agent_lines(role: AgentRole, symbol: &str) -> Vec<String> {
    let lines: &[&str] = match role {
        AgentRole::MarketAnalyst => &[
            "Pulling 90 days of price history for {s}",
            "{s} trades above its 50-day SMA; RSI sits near 58",
        ],
        AgentRole::SocialAnalyst => &[
            "Scanning social chatter about {s}",
            "Sentiment on {s} is mildly positive this week",
        ],
        AgentRole::NewsAnalyst => &[
            "Reviewing recent headlines for {s}",
            "No material negative news for {s} in the last 7 days",
        ],
        AgentRole::FundamentalsAnalyst => &[
            "Loading quarterly statements for {s}",
            "{s} margins expanded two quarters in a row",
        ],
        AgentRole::BullResearcher => &["Momentum and margins both argue for upside in {s}"],
        AgentRole::BearResearcher => &["Valuation on {s} already prices in the good news"],
        AgentRole::ResearchManager => &["The bull case is stronger; recommending a measured long in {s}"],
        AgentRole::Trader => &["Proposal: build a {s} position in three tranches"],
        AgentRole::AggressiveDebator => &["Size up; the trend in {s} is clear"],
        AgentRole::ConservativeDebator => &["Cap exposure to {s} at 2% of the book"],
        AgentRole::NeutralDebator => &["Tranches with a trailing stop balance both views on {s}"],
        AgentRole::RiskManager => &["Approving the plan for {s} with a trailing stop"],
    };
    lines.iter().map(|l| l.replace("{s}", symbol)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::registry::default_team;

    #[test]
    fn test_orderly_script_shape() {
        let team = vec![AgentRole::MarketAnalyst, AgentRole::Trader];
        let script = build_script("a-1", "AAPL", &team, &ScriptOptions::orderly());
        assert!(matches!(script.last(), Some(InboundEvent::Complete(_))));
        assert!(matches!(&script[1], InboundEvent::Status(s) if s.status == AgentStatus::Processing));

        let markers: Vec<u32> = script
            .iter()
            .filter_map(|e| match e {
                InboundEvent::Thought(t) if t.is_phase_complete => t.phase_order,
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec![1, 3]);
    }

    #[test]
    fn test_same_seed_same_script() {
        let options = ScriptOptions { seed: Some(42), ..Default::default() };
        let a = build_script("a", "NVDA", &default_team(), &options);
        let b = build_script("a", "NVDA", &default_team(), &options);
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_only_add_frames() {
        let orderly = build_script("a", "NVDA", &default_team(), &ScriptOptions::orderly());
        let noisy = build_script(
            "a",
            "NVDA",
            &default_team(),
            &ScriptOptions { shuffle_window: 0, duplicate_rate: 1.0, seed: Some(0) },
        );
        // the terminal frame is never duplicated
        assert_eq!(noisy.len(), (orderly.len() - 1) * 2 + 1);
    }

    #[test]
    fn test_node_order_restarts_per_phase() {
        let team = vec![AgentRole::MarketAnalyst, AgentRole::BullResearcher];
        let script = build_script("a", "MSFT", &team, &ScriptOptions::orderly());
        let first_debate_node = script.iter().find_map(|e| match e {
            InboundEvent::Thought(t) if t.phase_order == Some(2) => t.node_order,
            _ => None,
        });
        assert_eq!(first_debate_node, Some(1));
    }
}
