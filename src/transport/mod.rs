pub mod poller;
pub mod rest;
pub mod ws;

pub use poller::{poll_task, SnapshotDiff};
pub use rest::RestClient;
pub use ws::{control_channel, run_event_stream, ConnectionState, ControlHandle, WsConfig};
