use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::config::{parse_config, MarketdeskConfig};
use crate::db::Database;
use crate::errors::MarketdeskError;
use crate::monitor::{Monitor, MonitorReport};
use crate::pipeline::DisplayMessage;
use crate::render::{render_message, render_summary, AnalysisProgress};

const DEFAULT_CONFIG_FILE: &str = "marketdesk.yaml";
const TRANSPORT_SHUTDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Default)]
pub struct LiveOptions {
    pub json: bool,
    pub quiet: bool,
}

pub struct LiveOutcome {
    pub report: MonitorReport,
    pub transport_error: Option<MarketdeskError>,
}

/// Load the named config, or `./marketdesk.yaml` if it exists, or defaults.
pub async fn load_config(path: Option<&str>) -> Result<MarketdeskConfig, MarketdeskError> {
    match path {
        Some(path) => parse_config(Path::new(path)).await,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => parse_config(Path::new(DEFAULT_CONFIG_FILE)).await,
        None => Ok(MarketdeskConfig::default()),
    }
}

/// Render a monitor's ordered output until the session ends, while
/// `transport` feeds it. Ctrl-C cancels the session and runs `on_interrupt`.
pub async fn run_live<T, I>(
    mut monitor: Monitor,
    symbol: &str,
    options: LiveOptions,
    transport: T,
    transport_token: CancellationToken,
    on_interrupt: I,
) -> Result<LiveOutcome, MarketdeskError>
where
    T: Future<Output = Result<(), MarketdeskError>>,
    I: FnOnce(),
{
    let mut progress = if options.json || options.quiet {
        AnalysisProgress::hidden(symbol)
    } else {
        AnalysisProgress::new(symbol)
    };
    // the monitor's own sender would keep the session open forever
    monitor.close_input();

    tokio::pin!(transport);
    let mut transport_done = false;
    let mut transport_error = None;
    let mut on_interrupt = Some(on_interrupt);

    loop {
        tokio::select! {
            message = monitor.next_message() => match message {
                Some(message) => {
                    progress.on_message(&message);
                    emit(&progress, &message, options.json)?;
                    let (state, totals) = monitor.snapshot().await;
                    progress.update(&state, &totals);
                }
                None => break,
            },
            result = &mut transport, if !transport_done => {
                transport_done = true;
                match result {
                    Ok(()) => debug!("Transport finished"),
                    Err(e) => {
                        warn!(error = %e, "Transport failed");
                        transport_error = Some(e);
                        monitor.cancel().await;
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if on_interrupt.is_some() => {
                info!("Interrupted, cancelling analysis");
                if let Some(callback) = on_interrupt.take() {
                    callback();
                }
                monitor.cancel().await;
            }
        }
    }

    transport_token.cancel();
    if !transport_done && tokio::time::timeout(TRANSPORT_SHUTDOWN, &mut transport).await.is_err() {
        debug!("Transport did not stop in time");
    }

    let report = monitor.finish().await?;
    match &transport_error {
        Some(e) => progress.abandon(&e.to_string()),
        None => progress.finish(&report.state),
    }
    if !options.json {
        println!("{}", render_summary(&report.state, &report.totals));
    }
    Ok(LiveOutcome { report, transport_error })
}

fn emit(progress: &AnalysisProgress, message: &DisplayMessage, json: bool) -> Result<(), MarketdeskError> {
    if json {
        println!("{}", serde_json::to_string(message)?);
    } else {
        progress.println(&render_message(message));
    }
    Ok(())
}

/// Record a finished run in the history database.
pub fn save_report(config: &MarketdeskConfig, report: &MonitorReport) -> Result<(), MarketdeskError> {
    let path = config.db_path();
    let db = Database::new(&path)?;
    db.save_history(&report.history, &report.usage)?;
    info!(analysis_id = %report.history.analysis_id, db = %path.display(), "Saved to history");
    Ok(())
}

/// Shared tail of the live commands: persist, then surface a transport
/// failure as the command's error.
pub fn conclude(config: &MarketdeskConfig, outcome: LiveOutcome, save: bool) -> Result<(), MarketdeskError> {
    if save {
        if let Err(e) = save_report(config, &outcome.report) {
            warn!(error = %e, "Could not save history");
        }
    }
    match outcome.transport_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
