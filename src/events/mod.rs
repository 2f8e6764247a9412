pub mod inbound;
pub mod outbound;

pub use inbound::{
    decode_event, AgentStatus, CompleteEvent, ErrorEvent, InboundEvent, StatusEvent,
    ThoughtEvent, TokenUsage, ToolEvent,
};
pub use outbound::OutboundMessage;
