use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::cli::commands::{split_agents, WatchArgs};
use crate::cli::live::{conclude, load_config, run_live, LiveOptions};
use crate::errors::MarketdeskError;
use crate::events::OutboundMessage;
use crate::monitor::Monitor;
use crate::render::terminal::render_connection;
use crate::transport::{control_channel, run_event_stream, ConnectionState};

pub async fn handle_watch(args: WatchArgs, config_path: Option<&str>, quiet: bool) -> Result<(), MarketdeskError> {
    let config = load_config(config_path)
        .await?
        .with_analysis(args.symbol.as_deref(), split_agents(args.agents.as_deref()))?;

    let mut ws = config.ws_config();
    if let Some(url) = &args.ws_url {
        ws.url = url.clone();
    }
    let analysis_id = args
        .analysis_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let symbol = config.symbol();
    info!(analysis_id = %analysis_id, symbol = %symbol, url = %ws.url, "Watching analysis");

    let monitor = Monitor::start(&analysis_id, &symbol, &config);
    let events = monitor.sender()?;
    let (control, control_rx) = control_channel();
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let token = CancellationToken::new();

    let subscribe = OutboundMessage::Subscribe {
        analysis_id: analysis_id.clone(),
        symbol: Some(symbol.clone()),
        agents: config.team_names(),
    };
    let url = ws.url.clone();
    let stream = run_event_stream(ws, subscribe, events, control_rx, state_tx, token.clone());
    let status = tokio::spawn(report_connection(state_rx, url, quiet || args.json));

    let cancel_id = analysis_id.clone();
    let outcome = run_live(
        monitor,
        &symbol,
        LiveOptions { json: args.json, quiet },
        stream,
        token,
        move || {
            if let Err(e) = control.send(OutboundMessage::Cancel { analysis_id: cancel_id }) {
                warn!(error = %e, "Could not send cancel to backend");
            }
        },
    )
    .await;
    status.abort();

    conclude(&config, outcome?, !args.no_save)
}

/// Print connection transitions to stderr so they never interleave with
/// JSON output on stdout.
async fn report_connection(mut state: watch::Receiver<ConnectionState>, url: String, silent: bool) {
    let mut last = *state.borrow();
    while state.changed().await.is_ok() {
        let current = *state.borrow_and_update();
        if current == last {
            continue;
        }
        last = current;
        if !silent && current != ConnectionState::Connecting {
            eprintln!("{}", render_connection(current, &url));
        }
    }
}
