pub mod agents;
pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod models;
pub mod monitor;
pub mod pipeline;
pub mod render;
pub mod simulator;
pub mod stores;
pub mod transport;
pub mod utils;
