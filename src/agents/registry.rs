use std::sync::LazyLock;
use crate::pipeline::phase::PhaseName;
use serde::{Deserialize, Serialize};

/// Canonical identity of every agent the analysis backend can field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    MarketAnalyst,
    SocialAnalyst,
    NewsAnalyst,
    FundamentalsAnalyst,
    BullResearcher,
    BearResearcher,
    ResearchManager,
    Trader,
    AggressiveDebator,
    ConservativeDebator,
    NeutralDebator,
    RiskManager,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketAnalyst => "market_analyst",
            Self::SocialAnalyst => "social_analyst",
            Self::NewsAnalyst => "news_analyst",
            Self::FundamentalsAnalyst => "fundamentals_analyst",
            Self::BullResearcher => "bull_researcher",
            Self::BearResearcher => "bear_researcher",
            Self::ResearchManager => "research_manager",
            Self::Trader => "trader",
            Self::AggressiveDebator => "aggressive_debator",
            Self::ConservativeDebator => "conservative_debator",
            Self::NeutralDebator => "neutral_debator",
            Self::RiskManager => "risk_manager",
        }
    }

    pub fn definition(&self) -> &'static AgentDefinition {
        AGENT_REGISTRY
            .iter()
            .find(|d| d.role == *self)
            .unwrap_or(&AGENT_REGISTRY[0])
    }

    pub fn display_name(&self) -> &'static str {
        self.definition().display_name
    }

    pub fn phase(&self) -> PhaseName {
        self.definition().phase
    }

    /// Resolve any naming variant the backend uses (display names, snake,
    /// kebab, camel-ish, Chinese labels) to a canonical role.
    pub fn normalize(name: &str) -> Option<Self> {
        let key = alias_key(name);
        if key.is_empty() {
            return None;
        }
        AGENT_REGISTRY.iter().find_map(|def| {
            let hit = def.role.as_str() == key
                || def.aliases.iter().any(|a| *a == key);
            hit.then_some(def.role)
        })
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::normalize(s).ok_or_else(|| format!("unknown agent: {}", s))
    }
}

fn alias_key(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let key: String = lowered
        .chars()
        .map(|c| if c == '-' || c.is_whitespace() { '_' } else { c })
        .collect();
    let key = key.trim_matches('_');
    key.strip_suffix("_agent").unwrap_or(key).to_string()
}

pub struct AgentDefinition {
    pub role: AgentRole,
    pub display_name: &'static str,
    pub phase: PhaseName,
    pub aliases: &'static [&'static str],
}

pub static AGENT_REGISTRY: LazyLock<Vec<AgentDefinition>> = LazyLock::new(|| vec![
    AgentDefinition {
        role: AgentRole::MarketAnalyst,
        display_name: "Market Analyst",
        phase: PhaseName::Analysis,
        aliases: &["market", "technical", "technical_analyst", "市场分析师", "技术分析师"],
    },
    AgentDefinition {
        role: AgentRole::SocialAnalyst,
        display_name: "Social Media Analyst",
        phase: PhaseName::Analysis,
        aliases: &["social", "social_media_analyst", "sentiment", "sentiment_analyst", "社交媒体分析师", "情绪分析师"],
    },
    AgentDefinition {
        role: AgentRole::NewsAnalyst,
        display_name: "News Analyst",
        phase: PhaseName::Analysis,
        aliases: &["news", "新闻分析师"],
    },
    AgentDefinition {
        role: AgentRole::FundamentalsAnalyst,
        display_name: "Fundamentals Analyst",
        phase: PhaseName::Analysis,
        aliases: &["fundamentals", "fundamental", "fundamental_analyst", "基本面分析师"],
    },
    AgentDefinition {
        role: AgentRole::BullResearcher,
        display_name: "Bull Researcher",
        phase: PhaseName::Debate,
        aliases: &["bull", "bullish_researcher", "多头研究员", "看涨研究员"],
    },
    AgentDefinition {
        role: AgentRole::BearResearcher,
        display_name: "Bear Researcher",
        phase: PhaseName::Debate,
        aliases: &["bear", "bearish_researcher", "空头研究员", "看跌研究员"],
    },
    AgentDefinition {
        role: AgentRole::ResearchManager,
        display_name: "Research Manager",
        phase: PhaseName::Debate,
        aliases: &["investment_judge", "research_judge", "研究经理", "研究主管"],
    },
    AgentDefinition {
        role: AgentRole::Trader,
        display_name: "Trader",
        phase: PhaseName::Trading,
        aliases: &["trading", "trader_agent", "交易员"],
    },
    AgentDefinition {
        role: AgentRole::AggressiveDebator,
        display_name: "Aggressive Risk Analyst",
        phase: PhaseName::Risk,
        aliases: &["aggressive", "risky", "risky_analyst", "risky_debator", "aggressive_analyst", "激进风险分析师", "激进分析师"],
    },
    AgentDefinition {
        role: AgentRole::ConservativeDebator,
        display_name: "Conservative Risk Analyst",
        phase: PhaseName::Risk,
        aliases: &["conservative", "safe", "safe_analyst", "safe_debator", "conservative_analyst", "保守风险分析师", "保守分析师"],
    },
    AgentDefinition {
        role: AgentRole::NeutralDebator,
        display_name: "Neutral Risk Analyst",
        phase: PhaseName::Risk,
        aliases: &["neutral", "neutral_analyst", "中性风险分析师", "中性分析师"],
    },
    AgentDefinition {
        role: AgentRole::RiskManager,
        display_name: "Risk Manager",
        phase: PhaseName::Decision,
        aliases: &["risk_judge", "portfolio_manager", "风险经理", "投资组合经理"],
    },
]);

/// Fixed order in which the backend hands the floor from agent to agent.
pub static AGENT_EXECUTION_ORDER: &[AgentRole] = &[
    AgentRole::MarketAnalyst,
    AgentRole::SocialAnalyst,
    AgentRole::NewsAnalyst,
    AgentRole::FundamentalsAnalyst,
    AgentRole::BullResearcher,
    AgentRole::BearResearcher,
    AgentRole::ResearchManager,
    AgentRole::Trader,
    AgentRole::AggressiveDebator,
    AgentRole::ConservativeDebator,
    AgentRole::NeutralDebator,
    AgentRole::RiskManager,
];

pub fn execution_index(role: AgentRole) -> usize {
    AGENT_EXECUTION_ORDER
        .iter()
        .position(|r| *r == role)
        .unwrap_or(AGENT_EXECUTION_ORDER.len())
}

/// Default team when the caller does not pick one.
pub fn default_team() -> Vec<AgentRole> {
    AGENT_EXECUTION_ORDER.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_every_role_once() {
        assert_eq!(AGENT_REGISTRY.len(), AGENT_EXECUTION_ORDER.len());
        for role in AGENT_EXECUTION_ORDER {
            assert_eq!(AGENT_REGISTRY.iter().filter(|d| d.role == *role).count(), 1);
        }
    }

    #[test]
    fn test_normalize_variants() {
        assert_eq!(AgentRole::normalize("Market Analyst"), Some(AgentRole::MarketAnalyst));
        assert_eq!(AgentRole::normalize("market-analyst"), Some(AgentRole::MarketAnalyst));
        assert_eq!(AgentRole::normalize("market_analyst"), Some(AgentRole::MarketAnalyst));
        assert_eq!(AgentRole::normalize("technical"), Some(AgentRole::MarketAnalyst));
        assert_eq!(AgentRole::normalize("bull-researcher-agent"), Some(AgentRole::BullResearcher));
        assert_eq!(AgentRole::normalize("看跌研究员"), Some(AgentRole::BearResearcher));
        assert_eq!(AgentRole::normalize("Risky Analyst"), Some(AgentRole::AggressiveDebator));
        assert_eq!(AgentRole::normalize("Portfolio Manager"), Some(AgentRole::RiskManager));
    }

    #[test]
    fn test_normalize_unknown() {
        assert_eq!(AgentRole::normalize("system"), None);
        assert_eq!(AgentRole::normalize(""), None);
        assert_eq!(AgentRole::normalize("   "), None);
    }

    #[test]
    fn test_execution_order_is_phase_monotonic() {
        let phases: Vec<u32> = AGENT_EXECUTION_ORDER.iter().map(|r| r.phase().order()).collect();
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
    }
}
