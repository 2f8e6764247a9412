use serde::{Deserialize, Serialize};

/// Coarse stages of the backend's multi-agent run. The backend reports them
/// as a `phase` label and a numeric `phaseOrder` starting at 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseName {
    Analysis,
    Debate,
    Trading,
    Risk,
    Decision,
}

impl PhaseName {
    pub fn order(&self) -> u32 {
        match self {
            Self::Analysis => 1,
            Self::Debate => 2,
            Self::Trading => 3,
            Self::Risk => 4,
            Self::Decision => 5,
        }
    }

    pub fn from_order(order: u32) -> Option<Self> {
        PHASES.iter().map(|p| p.name).find(|p| p.order() == order)
    }

    /// Lenient parse of the backend's phase label.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "analysis" | "analysts" | "analyst" | "分析" | "分析阶段" => Some(Self::Analysis),
            "debate" | "research" | "investment_debate" | "辩论" | "研究辩论" => Some(Self::Debate),
            "trading" | "trade" | "交易" => Some(Self::Trading),
            "risk" | "risk_debate" | "risk_analysis" | "风险" | "风险评估" => Some(Self::Risk),
            "decision" | "final" | "portfolio" | "决策" => Some(Self::Decision),
            _ => None,
        }
    }
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Debate => write!(f, "debate"),
            Self::Trading => write!(f, "trading"),
            Self::Risk => write!(f, "risk"),
            Self::Decision => write!(f, "decision"),
        }
    }
}

pub struct PhaseDefinition {
    pub name: PhaseName,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub static PHASES: &[PhaseDefinition] = &[
    PhaseDefinition {
        name: PhaseName::Analysis,
        display_name: "Market Analysis",
        description: "Technical, sentiment, news and fundamental analysts study the symbol",
    },
    PhaseDefinition {
        name: PhaseName::Debate,
        display_name: "Investment Debate",
        description: "Bull and bear researchers argue, the research manager rules",
    },
    PhaseDefinition {
        name: PhaseName::Trading,
        display_name: "Trading Plan",
        description: "The trader turns the investment plan into a concrete proposal",
    },
    PhaseDefinition {
        name: PhaseName::Risk,
        display_name: "Risk Debate",
        description: "Aggressive, conservative and neutral analysts stress the proposal",
    },
    PhaseDefinition {
        name: PhaseName::Decision,
        display_name: "Final Decision",
        description: "The risk manager issues the final trading decision",
    },
];

pub fn display_name(phase: PhaseName) -> &'static str {
    PHASES
        .iter()
        .find(|p| p.name == phase)
        .map(|p| p.display_name)
        .unwrap_or("Unknown")
}
