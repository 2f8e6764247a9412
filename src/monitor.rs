use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use crate::config::MarketdeskConfig;
use crate::errors::MarketdeskError;
use crate::events::InboundEvent;
use crate::models::HistoryEntry;
use crate::pipeline::{DisplayMessage, Session, SessionDriver};
use crate::stores::cost::ModelUsage;
use crate::stores::{AnalysisState, AnalysisStore, CostLedger, LedgerTotals, TaskQueue, TaskRecord};

const EVENT_CAPACITY: usize = 1024;
const STORE_DRAIN: Duration = Duration::from_secs(2);

/// What a finished analysis leaves behind.
pub struct MonitorReport {
    pub session: Session,
    pub state: AnalysisState,
    pub totals: LedgerTotals,
    pub usage: BTreeMap<String, ModelUsage>,
    pub history: HistoryEntry,
    pub task: Option<TaskRecord>,
}

/// One live analysis: a broadcast fan-out feeding the ordering session and
/// the state stores independently.
pub struct Monitor {
    analysis_id: String,
    events: Option<broadcast::Sender<InboundEvent>>,
    driver: SessionDriver,
    output: mpsc::UnboundedReceiver<DisplayMessage>,
    analysis: Arc<RwLock<AnalysisStore>>,
    ledger: Arc<RwLock<CostLedger>>,
    tasks: Arc<RwLock<TaskQueue>>,
    stores: JoinHandle<()>,
    cancelled: bool,
}

impl Monitor {
    pub fn start(analysis_id: &str, symbol: &str, config: &MarketdeskConfig) -> Self {
        let session_config = config.session_config();
        let (events, session_rx) = broadcast::channel(EVENT_CAPACITY);
        let store_rx = events.subscribe();
        let (out_tx, output) = mpsc::unbounded_channel();

        let analysis = Arc::new(RwLock::new(AnalysisStore::start(
            analysis_id,
            symbol,
            session_config.team.clone(),
        )));
        let ledger = Arc::new(RwLock::new(CostLedger::new(config.pricing_table())));
        let mut queue = TaskQueue::default();
        queue.submit(analysis_id, symbol);
        let tasks = Arc::new(RwLock::new(queue));

        let driver = SessionDriver::spawn(
            Session::new(analysis_id, session_config),
            session_rx,
            out_tx,
            config.starvation_tick(),
        );
        let stores = tokio::spawn(feed_stores(
            analysis_id.to_string(),
            store_rx,
            analysis.clone(),
            ledger.clone(),
            tasks.clone(),
        ));

        Self {
            analysis_id: analysis_id.to_string(),
            events: Some(events),
            driver,
            output,
            analysis,
            ledger,
            tasks,
            stores,
            cancelled: false,
        }
    }

    /// Sender for a transport to publish into.
    pub fn sender(&self) -> Result<broadcast::Sender<InboundEvent>, MarketdeskError> {
        self.events
            .clone()
            .ok_or_else(|| MarketdeskError::Internal("Monitor input already closed".into()))
    }

    /// Drop the monitor's own sender; the session ends once every
    /// transport sender is gone too.
    pub fn close_input(&mut self) {
        self.events = None;
    }

    /// Next ordered line, or `None` once the session has ended.
    pub async fn next_message(&mut self) -> Option<DisplayMessage> {
        self.output.recv().await
    }

    pub async fn snapshot(&self) -> (AnalysisState, LedgerTotals) {
        let state = self.analysis.read().await.state().clone();
        let totals = self.ledger.read().await.totals();
        (state, totals)
    }

    pub async fn cancel(&mut self) {
        self.cancelled = true;
        self.driver.cancel();
        self.analysis.write().await.cancel();
        self.tasks.write().await.cancel(&self.analysis_id);
    }

    pub async fn finish(mut self) -> Result<MonitorReport, MarketdeskError> {
        self.events = None;
        let session = self.driver.join().await?;
        if !self.cancelled
            && tokio::time::timeout(STORE_DRAIN, &mut self.stores).await.is_err()
        {
            warn!("Stores did not see the end of the stream");
        }
        self.stores.abort();

        let mut analysis = self.analysis.write().await;
        let mut tasks = self.tasks.write().await;
        if analysis.state().analyzing && !session.is_finished() {
            analysis.cancel();
            tasks.cancel(&self.analysis_id);
        }
        let ledger = self.ledger.read().await;
        Ok(MonitorReport {
            state: analysis.state().clone(),
            totals: ledger.totals(),
            usage: ledger.per_model().clone(),
            history: analysis.to_history_entry(&ledger),
            task: tasks.get(&self.analysis_id).cloned(),
            session,
        })
    }
}

async fn feed_stores(
    analysis_id: String,
    mut events: broadcast::Receiver<InboundEvent>,
    analysis: Arc<RwLock<AnalysisStore>>,
    ledger: Arc<RwLock<CostLedger>>,
    tasks: Arc<RwLock<TaskQueue>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                analysis.write().await.apply(&event);
                ledger.write().await.apply(&event);
                tasks.write().await.apply(&analysis_id, &event);
                if matches!(event, InboundEvent::Complete(_) | InboundEvent::Error(_)) {
                    debug!("Stores saw terminal event");
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Stores fell behind the transport"),
            Err(RecvError::Closed) => break,
        }
    }
}
