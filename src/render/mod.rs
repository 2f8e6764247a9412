pub mod progress;
pub mod terminal;

pub use progress::AnalysisProgress;
pub use terminal::{render_error, render_message, render_success, render_summary};
