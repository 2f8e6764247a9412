pub mod commands;
pub mod history;
pub mod live;
pub mod poll;
pub mod replay;
pub mod simulate;
pub mod watch;

pub use commands::{Cli, Commands};
