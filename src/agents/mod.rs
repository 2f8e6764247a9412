pub mod registry;

pub use registry::{AgentRole, AGENT_EXECUTION_ORDER, AGENT_REGISTRY};
