use std::sync::Arc;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use crate::config::DEFAULT_SYMBOL;
use crate::events::OutboundMessage;
use super::routes::resolve_team;
use super::task::SimTask;
use super::SimulatorState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SimulatorState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SimulatorState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    // nothing is streamed until the client says which analysis it wants
    let task = loop {
        let text = match receiver.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        };
        match serde_json::from_str::<OutboundMessage>(&text) {
            Ok(OutboundMessage::Subscribe { analysis_id, symbol, agents }) => {
                break subscribe(&state, analysis_id, symbol, &agents);
            }
            Ok(OutboundMessage::Cancel { analysis_id }) => {
                state.cancel(&analysis_id);
            }
            Err(e) => warn!(error = %e, "Unrecognized client frame"),
        }
    };
    let Some(task) = task else {
        let _ = sender.close().await;
        return;
    };

    let (backlog, mut live) = task.attach().await;
    let mut next = backlog.len();
    for frame in backlog {
        if sender.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok((index, frame)) => {
                    if index < next {
                        continue;
                    }
                    next = index + 1;
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(task_id = %task.id, skipped, "Subscriber fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(OutboundMessage::Cancel { analysis_id }) = serde_json::from_str(&text) {
                        state.cancel(&analysis_id);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!(task_id = %task.id, "Subscriber disconnected");
}

/// Attach to an existing task, or start one under the client's id.
fn subscribe(
    state: &SimulatorState,
    analysis_id: String,
    symbol: Option<String>,
    agents: &[String],
) -> Option<Arc<SimTask>> {
    if let Some(task) = state.get(&analysis_id) {
        info!(task_id = %analysis_id, "Subscriber attached");
        return Some(task);
    }
    let team = match resolve_team(agents) {
        Ok(team) => team,
        Err(_) => {
            warn!(task_id = %analysis_id, "Subscribe named unknown agents");
            return None;
        }
    };
    let symbol = symbol.unwrap_or_else(|| DEFAULT_SYMBOL.to_string());
    info!(task_id = %analysis_id, symbol = %symbol, "Starting analysis on subscribe");
    Some(state.start_task(analysis_id, symbol, team))
}
