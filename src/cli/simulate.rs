use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use crate::cli::commands::SimulateArgs;
use crate::cli::live::load_config;
use crate::errors::MarketdeskError;
use crate::render::render_success;
use crate::simulator::script::{build_script, ScriptOptions};
use crate::simulator::{serve, SimulatorState};

pub async fn handle_simulate(args: SimulateArgs, config_path: Option<&str>) -> Result<(), MarketdeskError> {
    if !(0.0..=1.0).contains(&args.duplicate_rate) {
        return Err(MarketdeskError::Config(format!(
            "duplicate rate must be between 0 and 1, got {}",
            args.duplicate_rate
        )));
    }
    let options = ScriptOptions {
        shuffle_window: args.shuffle,
        duplicate_rate: args.duplicate_rate,
        seed: args.seed,
    };

    if let Some(path) = &args.dump {
        let config = load_config(config_path)
            .await?
            .with_analysis(args.symbol.as_deref(), Vec::new())?;
        let symbol = config.symbol();
        let analysis_id = uuid::Uuid::new_v4().to_string();
        let script = build_script(&analysis_id, &symbol, &config.team(), &options);
        let mut out = String::new();
        for event in &script {
            out.push_str(&serde_json::to_string(event)?);
            out.push('\n');
        }
        tokio::fs::write(path, out).await?;
        println!("{}", render_success(&format!("Wrote {} events for {} to {}", script.len(), symbol, path)));
        return Ok(());
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| MarketdeskError::Config(format!("Invalid listen address: {}", e)))?;
    let state = SimulatorState::new(args.workers, options, Duration::from_millis(args.step_ms));
    let token = CancellationToken::new();

    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down simulator");
            shutdown.cancel();
        }
    });

    serve(addr, state, token).await
}
