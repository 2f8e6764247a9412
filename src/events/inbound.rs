use serde::{Deserialize, Serialize};
use crate::errors::MarketdeskError;

/// Events pushed by the analysis backend. Anything that does not match one
/// of these shapes is rejected by [`decode_event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    #[serde(rename = "agent.status")]
    Status(StatusEvent),
    #[serde(rename = "agent.thought")]
    Thought(ThoughtEvent),
    #[serde(rename = "agent.tool")]
    Tool(ToolEvent),
    #[serde(rename = "analysis.complete")]
    Complete(CompleteEvent),
    #[serde(rename = "error")]
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    #[serde(alias = "running")]
    Processing,
    #[serde(alias = "done")]
    Completed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub model: String,
    #[serde(default, alias = "prompt_tokens")]
    pub prompt_tokens: u64,
    #[serde(default, alias = "completion_tokens")]
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub agent: String,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(alias = "content")]
    pub thought: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_order: Option<u32>,
    #[serde(default)]
    pub is_phase_complete: bool,
    #[serde(default)]
    pub is_tool: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ToolEvent {
    /// Human-readable line for the tool invocation.
    pub fn describe(&self) -> String {
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return message.to_string();
        }
        match &self.args {
            Some(args) if !args.is_null() => format!("{}({})", self.tool, args),
            _ => format!("{}()", self.tool),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEvent {
    pub analysis_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

impl InboundEvent {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Status(_) => "agent.status",
            Self::Thought(_) => "agent.thought",
            Self::Tool(_) => "agent.tool",
            Self::Complete(_) => "analysis.complete",
            Self::Error(_) => "error",
        }
    }

    pub fn agent(&self) -> Option<&str> {
        match self {
            Self::Status(e) => Some(e.agent.as_str()),
            Self::Thought(e) => e.agent.as_deref(),
            Self::Tool(e) => e.agent.as_deref(),
            Self::Complete(_) | Self::Error(_) => None,
        }
    }

    pub fn content(&self) -> String {
        match self {
            Self::Status(e) => e.status.as_str().to_string(),
            Self::Thought(e) => e.thought.clone(),
            Self::Tool(e) => e.describe(),
            Self::Complete(e) => e.analysis_id.clone(),
            Self::Error(e) => e.message.clone(),
        }
    }

    pub fn phase_order(&self) -> Option<u32> {
        match self {
            Self::Thought(e) => e.phase_order,
            Self::Tool(e) => e.phase_order,
            _ => None,
        }
    }

    pub fn node_order(&self) -> Option<u32> {
        match self {
            Self::Thought(e) => e.node_order,
            Self::Tool(e) => e.node_order,
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self {
            Self::Status(e) => e.timestamp.as_deref(),
            Self::Thought(e) => e.timestamp.as_deref(),
            Self::Tool(e) => e.timestamp.as_deref(),
            Self::Complete(_) | Self::Error(_) => None,
        }
    }

    pub fn usage(&self) -> Option<&TokenUsage> {
        match self {
            Self::Status(e) => e.usage.as_ref(),
            Self::Complete(e) => e.usage.as_ref(),
            _ => None,
        }
    }

    /// Composite key used to recognize re-delivered events.
    pub fn fingerprint(&self) -> String {
        let opt = |v: Option<u32>| v.map(|n| n.to_string()).unwrap_or_default();
        format!(
            "{}|{}|{}|{}|{}",
            self.type_tag(),
            self.agent().unwrap_or_default(),
            self.content(),
            opt(self.phase_order()),
            opt(self.node_order()),
        )
    }
}

/// Validate a raw transport frame into a typed event.
pub fn decode_event(raw: &str) -> Result<InboundEvent, MarketdeskError> {
    serde_json::from_str(raw).map_err(|e| {
        let preview: String = raw.chars().take(120).collect();
        MarketdeskError::MalformedEvent(format!("{} in frame {}", e, preview))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_thought_with_ordering_fields() {
        let raw = r#"{"type":"agent.thought","agent":"Market Analyst","thought":"RSI is 71",
            "phase":"analysis","phaseOrder":1,"nodeOrder":3,"isPhaseComplete":false}"#;
        let event = decode_event(raw).unwrap();
        match &event {
            InboundEvent::Thought(t) => {
                assert_eq!(t.agent.as_deref(), Some("Market Analyst"));
                assert_eq!(t.phase_order, Some(1));
                assert_eq!(t.node_order, Some(3));
                assert!(!t.is_tool);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(event.type_tag(), "agent.thought");
    }

    #[test]
    fn test_decode_thought_content_alias() {
        let raw = r#"{"type":"agent.thought","content":"ready"}"#;
        let event = decode_event(raw).unwrap();
        assert_eq!(event.content(), "ready");
        assert_eq!(event.phase_order(), None);
    }

    #[test]
    fn test_decode_status_aliases() {
        let raw = r#"{"type":"agent.status","agent":"trader","status":"running"}"#;
        match decode_event(raw).unwrap() {
            InboundEvent::Status(s) => assert_eq!(s.status, AgentStatus::Processing),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_decode_usage_snake_case() {
        let raw = r#"{"type":"analysis.complete","analysisId":"a-1",
            "usage":{"model":"gpt-4o","prompt_tokens":1000,"completion_tokens":250}}"#;
        let event = decode_event(raw).unwrap();
        let usage = event.usage().unwrap();
        assert_eq!(usage.total(), 1250);
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let err = decode_event(r#"{"type":"agent.dance","agent":"x"}"#).unwrap_err();
        assert!(matches!(err, MarketdeskError::MalformedEvent(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_status() {
        assert!(decode_event(r#"{"type":"agent.status","agent":"x","status":"sleeping"}"#).is_err());
    }

    #[test]
    fn test_fingerprint_distinguishes_node_order() {
        let a = decode_event(r#"{"type":"agent.thought","agent":"A","thought":"x","phaseOrder":1,"nodeOrder":1}"#).unwrap();
        let b = decode_event(r#"{"type":"agent.thought","agent":"A","thought":"x","phaseOrder":1,"nodeOrder":2}"#).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
    }

    #[test]
    fn test_tool_describe() {
        let tool = ToolEvent {
            agent: None,
            tool: "get_stock_data".into(),
            args: Some(serde_json::json!({"symbol": "AAPL"})),
            message: None,
            phase: None,
            phase_order: None,
            node_order: None,
            timestamp: None,
        };
        assert_eq!(tool.describe(), r#"get_stock_data({"symbol":"AAPL"})"#);
    }
}
