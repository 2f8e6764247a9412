use std::time::Duration;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::errors::MarketdeskError;
use crate::events::{decode_event, InboundEvent, OutboundMessage};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Closed,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    /// `None` keeps retrying forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl WsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: None,
        }
    }
}

/// Handle for sending control frames to a running [`run_event_stream`] loop.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ControlHandle {
    pub fn send(&self, message: OutboundMessage) -> Result<(), MarketdeskError> {
        self.tx
            .send(message)
            .map_err(|_| MarketdeskError::Transport("Event stream is not running".into()))
    }
}

pub fn control_channel() -> (ControlHandle, mpsc::UnboundedReceiver<OutboundMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlHandle { tx }, rx)
}

/// Keep a WebSocket to the backend open and publish every decoded event.
///
/// The subscribe frame is resent after each reconnect. Malformed frames are
/// logged and skipped. Returns `Ok(())` on cancellation, or
/// `ReconnectExhausted` once the configured attempt limit is reached.
pub async fn run_event_stream(
    config: WsConfig,
    subscribe: OutboundMessage,
    events: broadcast::Sender<InboundEvent>,
    mut control: mpsc::UnboundedReceiver<OutboundMessage>,
    state: watch::Sender<ConnectionState>,
    cancel_token: CancellationToken,
) -> Result<(), MarketdeskError> {
    let mut failures: u32 = 0;

    loop {
        if cancel_token.is_cancelled() {
            break;
        }
        let _ = state.send(ConnectionState::Connecting);

        let connect = tokio::select! {
            _ = cancel_token.cancelled() => break,
            connect = connect_async(config.url.as_str()) => connect,
        };
        let (mut ws, _) = match connect {
            Ok(value) => value,
            Err(e) => {
                failures += 1;
                warn!(url = %config.url, attempt = failures, error = %e, "WebSocket connect failed");
                let _ = state.send(ConnectionState::Disconnected);
                if let Some(max) = config.max_reconnect_attempts {
                    if failures >= max {
                        let _ = state.send(ConnectionState::Closed);
                        return Err(MarketdeskError::ReconnectExhausted(failures));
                    }
                }
                if wait_reconnect(&cancel_token, config.reconnect_delay).await {
                    continue;
                }
                break;
            }
        };
        failures = 0;
        info!(url = %config.url, analysis_id = %subscribe.analysis_id(), "WebSocket connected");
        let _ = state.send(ConnectionState::Connected);

        if ws.send(Message::Text(subscribe.to_json())).await.is_err() {
            warn!("Subscribe frame could not be sent");
            let _ = ws.close(None).await;
            let _ = state.send(ConnectionState::Disconnected);
            if wait_reconnect(&cancel_token, config.reconnect_delay).await {
                continue;
            }
            break;
        }

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    let _ = ws.close(None).await;
                    let _ = state.send(ConnectionState::Closed);
                    return Ok(());
                }
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => publish(&events, &text),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read failed");
                        break;
                    }
                },
                Some(out) = control.recv() => {
                    debug!(analysis_id = %out.analysis_id(), "Sending control frame");
                    if ws.send(Message::Text(out.to_json())).await.is_err() {
                        break;
                    }
                }
            }
        }

        let _ = state.send(ConnectionState::Disconnected);
        if !wait_reconnect(&cancel_token, config.reconnect_delay).await {
            break;
        }
    }

    let _ = state.send(ConnectionState::Closed);
    Ok(())
}

/// Sleep out the reconnect delay. `false` means the token fired first.
async fn wait_reconnect(cancel_token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = cancel_token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn publish(events: &broadcast::Sender<InboundEvent>, raw: &str) {
    match decode_event(raw) {
        Ok(event) => {
            // no receivers just means nobody is listening yet
            let _ = events.send(event);
        }
        Err(e) => warn!(error = %e, "Dropping frame"),
    }
}
