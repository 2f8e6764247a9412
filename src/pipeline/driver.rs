use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::errors::MarketdeskError;
use crate::events::InboundEvent;
use super::message::DisplayMessage;
use super::session::Session;

/// Owns a [`Session`] on its own task. Events are handled strictly one at a
/// time and the starvation tick runs on the same task, so it stops exactly
/// when the session does.
pub struct SessionDriver {
    cancel_token: CancellationToken,
    handle: JoinHandle<Session>,
}

impl SessionDriver {
    pub fn spawn(
        session: Session,
        events: broadcast::Receiver<InboundEvent>,
        output: mpsc::UnboundedSender<DisplayMessage>,
        tick_every: Duration,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(drive(
            session,
            events,
            output,
            tick_every,
            cancel_token.clone(),
        ));
        Self { cancel_token, handle }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the session. Its ordering state is discarded.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the session to end and hand it back.
    pub async fn join(self) -> Result<Session, MarketdeskError> {
        self.handle
            .await
            .map_err(|e| MarketdeskError::Internal(format!("Session task failed: {}", e)))
    }
}

async fn drive(
    mut session: Session,
    mut events: broadcast::Receiver<InboundEvent>,
    output: mpsc::UnboundedSender<DisplayMessage>,
    tick_every: Duration,
    cancel_token: CancellationToken,
) -> Session {
    let mut ticker = tokio::time::interval(tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    info!(analysis_id = %session.analysis_id(), "Session started");

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!(analysis_id = %session.analysis_id(), "Session cancelled");
                session.reset();
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    let now = tokio::time::Instant::now().into_std();
                    forward(&output, session.handle_event(&event, now));
                    if session.is_finished() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session fell behind the transport; events lost");
                }
                Err(RecvError::Closed) => {
                    debug!("Event transport closed");
                    forward(&output, session.drain());
                    break;
                }
            },
            _ = ticker.tick() => {
                let now = tokio::time::Instant::now().into_std();
                forward(&output, session.tick(now));
            }
        }
    }

    info!(
        analysis_id = %session.analysis_id(),
        pending = session.pending(),
        "Session ended"
    );
    session
}

fn forward(output: &mpsc::UnboundedSender<DisplayMessage>, messages: Vec<DisplayMessage>) {
    for message in messages {
        let _ = output.send(message);
    }
}
