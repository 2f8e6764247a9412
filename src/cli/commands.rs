use clap::{Parser, Subcommand, Args};

#[derive(Parser)]
#[command(name = "marketdesk", version, about = "Live console for multi-agent market analysis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// YAML configuration file (defaults to ./marketdesk.yaml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Follow an analysis over the backend's WebSocket stream
    Watch(WatchArgs),
    /// Follow an analysis by polling the REST task API
    Poll(PollArgs),
    /// Feed recorded events through the ordering pipeline
    Replay(ReplayArgs),
    /// Browse finished analyses
    History(HistoryArgs),
    /// Run a mock analysis backend
    Simulate(SimulateArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct WatchArgs {
    /// Ticker to analyze
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Comma-separated agent team, e.g. market_analyst,trader
    #[arg(short, long)]
    pub agents: Option<String>,

    /// Attach to an existing analysis instead of starting a new one
    #[arg(long)]
    pub analysis_id: Option<String>,

    /// Override backend.ws_url
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Print display messages as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Do not record the run in history
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Args, Clone)]
pub struct PollArgs {
    /// Existing task to follow; a new task is created when omitted
    #[arg(long)]
    pub task_id: Option<String>,

    /// Ticker to analyze
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Comma-separated agent team
    #[arg(short, long)]
    pub agents: Option<String>,

    /// Override backend.api_url
    #[arg(long)]
    pub api_url: Option<String>,

    /// Seconds between polls (overrides backend.poll_interval_secs)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Print display messages as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Do not record the run in history
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Args, Clone)]
pub struct ReplayArgs {
    /// JSON-lines file (or JSON array) of backend events
    pub file: String,

    /// Milliseconds to wait between events
    #[arg(long, default_value = "0")]
    pub delay_ms: u64,

    /// Analysis id to report under
    #[arg(long, default_value = "replay")]
    pub analysis_id: String,

    /// Ticker shown in the summary
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Print display messages as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Record the replay in history
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Clone)]
pub struct HistoryArgs {
    /// Show one analysis in detail
    #[arg(long)]
    pub id: Option<String>,

    /// Only analyses of this ticker
    #[arg(short, long)]
    pub symbol: Option<String>,

    /// Maximum number of rows
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Delete an analysis from history
    #[arg(long)]
    pub delete: Option<String>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone)]
pub struct SimulateArgs {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Listen port
    #[arg(long, default_value = "8000")]
    pub port: u16,

    /// Analyses allowed to run at once; the rest queue
    #[arg(long, default_value = "2")]
    pub workers: usize,

    /// Milliseconds between frames
    #[arg(long, default_value = "400")]
    pub step_ms: u64,

    /// How far frames may drift from their natural position
    #[arg(long, default_value = "3")]
    pub shuffle: usize,

    /// Probability of delivering a frame twice
    #[arg(long, default_value = "0.15")]
    pub duplicate_rate: f64,

    /// Seed for reproducible scripts
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write one script as JSON lines to this file and exit
    #[arg(long)]
    pub dump: Option<String>,

    /// Ticker for --dump
    #[arg(short, long)]
    pub symbol: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// Configuration file to check
    pub config: String,
}

/// Split a comma-separated agent list.
pub fn split_agents(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from(["marketdesk", "-vv", "watch", "--symbol", "NVDA", "--agents", "trader, risk_manager"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.symbol.as_deref(), Some("NVDA"));
                assert_eq!(split_agents(args.agents.as_deref()), vec!["trader", "risk_manager"]);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_parse_simulate_defaults() {
        let cli = Cli::try_parse_from(["marketdesk", "simulate"]).unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.port, 8000);
                assert_eq!(args.shuffle, 3);
                assert!(args.dump.is_none());
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["marketdesk", "history", "--config", "desk.yaml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("desk.yaml"));
    }

    #[test]
    fn test_replay_requires_file() {
        assert!(Cli::try_parse_from(["marketdesk", "replay"]).is_err());
    }
}
