use serde::{Deserialize, Serialize};

/// Control messages sent to the analysis backend over the event transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "analysis.subscribe")]
    Subscribe {
        #[serde(rename = "analysisId")]
        analysis_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        symbol: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        agents: Vec<String>,
    },
    #[serde(rename = "analysis.cancel")]
    Cancel {
        #[serde(rename = "analysisId")]
        analysis_id: String,
    },
}

impl OutboundMessage {
    pub fn analysis_id(&self) -> &str {
        match self {
            Self::Subscribe { analysis_id, .. } | Self::Cancel { analysis_id } => analysis_id,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_subscribe_wire_shape() {
        let msg = OutboundMessage::Subscribe {
            analysis_id: "a-1".into(),
            symbol: Some("NVDA".into()),
            agents: vec!["market_analyst".into()],
        };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value, json!({
            "type": "analysis.subscribe",
            "analysisId": "a-1",
            "symbol": "NVDA",
            "agents": ["market_analyst"],
        }));
    }

    #[test]
    fn test_cancel_wire_shape() {
        let msg = OutboundMessage::Cancel { analysis_id: "a-2".into() };
        let value: Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(value, json!({"type": "analysis.cancel", "analysisId": "a-2"}));
        assert_eq!(msg.analysis_id(), "a-2");
    }
}
