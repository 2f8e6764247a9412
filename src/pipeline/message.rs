use chrono::{DateTime, Local, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    Agent,
    Tool,
    Error,
}

/// A display-ready line produced by the ordering pipeline. Never mutated
/// once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    pub id: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_order: Option<u32>,
}

impl DisplayMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            time: Local::now().format("%H:%M:%S").to_string(),
            kind,
            content: content.into(),
            agent: None,
            phase_order: None,
            node_order: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageKind::System, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, content)
    }

    pub fn with_agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_ordering(mut self, phase_order: Option<u32>, node_order: Option<u32>) -> Self {
        self.phase_order = phase_order;
        self.node_order = node_order;
        self
    }

    /// Use the backend's timestamp for the clock column when it parses.
    pub fn with_timestamp(mut self, timestamp: Option<&str>) -> Self {
        if let Some(time) = timestamp.and_then(display_time) {
            self.time = time;
        }
        self
    }
}

/// Render a backend timestamp (RFC 3339, or already a bare clock time) as
/// local `HH:MM:SS`.
pub fn display_time(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).format("%H:%M:%S").to_string());
    }
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .ok()
        .map(|t| t.format("%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_time_clock_passthrough() {
        assert_eq!(display_time("09:30:05").as_deref(), Some("09:30:05"));
    }

    #[test]
    fn test_display_time_rfc3339_shape() {
        let rendered = display_time("2024-05-01T14:03:07Z").unwrap();
        assert_eq!(rendered.len(), 8);
        assert_eq!(rendered.matches(':').count(), 2);
    }

    #[test]
    fn test_display_time_garbage() {
        assert_eq!(display_time("yesterday"), None);
    }

    #[test]
    fn test_messages_get_unique_ids() {
        let a = DisplayMessage::system("a");
        let b = DisplayMessage::system("a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, MessageKind::System);
    }

    #[test]
    fn test_serialized_kind_field_is_type() {
        let msg = DisplayMessage::error("boom").with_ordering(Some(2), None);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["phaseOrder"], 2);
        assert!(value.get("nodeOrder").is_none());
    }
}
