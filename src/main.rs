use clap::Parser;
use marketdesk::cli::{self, Commands};
use marketdesk::config::check_config;
use marketdesk::errors::MarketdeskError;
use marketdesk::render::{render_error, render_success};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match (cli.quiet, cli.verbose) {
        (true, 0) => "warn",
        (_, 0) => "info",
        (_, 1) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Watch(args) => cli::watch::handle_watch(args, config, cli.quiet).await,
        Commands::Poll(args) => cli::poll::handle_poll(args, config, cli.quiet).await,
        Commands::Replay(args) => cli::replay::handle_replay(args, config, cli.quiet).await,
        Commands::History(args) => cli::history::handle_history(args, config).await,
        Commands::Simulate(args) => cli::simulate::handle_simulate(args, config).await,
        Commands::Validate(args) => handle_validate(args).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{}", render_error(&e.to_string()));
            let exit_code = match &e {
                MarketdeskError::Config(_) | MarketdeskError::Yaml(_) => 2,
                MarketdeskError::ReconnectExhausted(_)
                | MarketdeskError::Transport(_)
                | MarketdeskError::Network(_)
                | MarketdeskError::WebSocket(_)
                | MarketdeskError::Http(_) => 3,
                MarketdeskError::TaskNotFound(_) => 4,
                MarketdeskError::Database(_) => 5,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), MarketdeskError> {
    let content = tokio::fs::read_to_string(&args.config).await.map_err(|e| {
        MarketdeskError::Config(format!("Cannot read {}: {}", args.config, e))
    })?;
    let (_config, warnings) = check_config(&content)?;
    for warning in &warnings {
        eprintln!("  warning: {}", warning);
    }
    println!("{}", render_success(&format!("Configuration is valid: {}", args.config)));
    Ok(())
}
