use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::cli::commands::ReplayArgs;
use crate::cli::live::{conclude, load_config, run_live, LiveOptions};
use crate::errors::MarketdeskError;
use crate::events::{decode_event, InboundEvent};
use crate::monitor::Monitor;

/// Keep the broadcast queue well under its capacity so a fast replay never
/// makes the pipeline lag.
const HIGH_WATER: usize = 256;

pub async fn handle_replay(args: ReplayArgs, config_path: Option<&str>, quiet: bool) -> Result<(), MarketdeskError> {
    let config = load_config(config_path)
        .await?
        .with_analysis(args.symbol.as_deref(), Vec::new())?;
    let frames = read_frames(Path::new(&args.file)).await?;
    info!(file = %args.file, frames = frames.len(), "Replaying recorded events");

    let symbol = config.symbol();
    let monitor = Monitor::start(&args.analysis_id, &symbol, &config);
    let events = monitor.sender()?;
    let token = CancellationToken::new();
    let feed = feed_frames(frames, events, Duration::from_millis(args.delay_ms), token.clone());

    let outcome = run_live(
        monitor,
        &symbol,
        LiveOptions { json: args.json, quiet },
        feed,
        token,
        || {},
    )
    .await?;

    conclude(&config, outcome, args.save)
}

/// Raw frames from a JSON-lines file, or from a file holding one JSON array.
pub async fn read_frames(path: &Path) -> Result<Vec<String>, MarketdeskError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            MarketdeskError::Config(format!("Replay file not found: {}", path.display()))
        } else {
            MarketdeskError::Io(e)
        }
    })?;
    split_frames(&content)
}

fn split_frames(content: &str) -> Result<Vec<String>, MarketdeskError> {
    if content.trim_start().starts_with('[') {
        let values: Vec<serde_json::Value> = serde_json::from_str(content)?;
        return Ok(values.iter().map(|v| v.to_string()).collect());
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

async fn feed_frames(
    frames: Vec<String>,
    events: broadcast::Sender<InboundEvent>,
    delay: Duration,
    cancel_token: CancellationToken,
) -> Result<(), MarketdeskError> {
    let mut skipped = 0usize;
    for (line, raw) in frames.iter().enumerate() {
        if cancel_token.is_cancelled() {
            break;
        }
        let event = match decode_event(raw) {
            Ok(event) => event,
            Err(e) => {
                skipped += 1;
                warn!(line = line + 1, error = %e, "Skipping malformed frame");
                continue;
            }
        };
        while events.len() >= HIGH_WATER {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        if events.send(event).is_err() {
            break;
        }
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
    if skipped > 0 {
        warn!(skipped, "Replay finished with malformed frames");
    }
    Ok(())
}
