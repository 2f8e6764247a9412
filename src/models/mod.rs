pub mod history;
pub mod task;

pub use history::HistoryEntry;
pub use task::{AgentProgress, CreateTaskRequest, TaskSnapshot, TaskStatus};
