pub mod agent_tracker;
pub mod dedup;
pub mod driver;
pub mod message;
pub mod phase;
pub mod phase_buffer;
pub mod render_log;
pub mod session;

pub use driver::SessionDriver;
pub use message::{DisplayMessage, MessageKind};
pub use session::{Session, SessionConfig};
