pub mod routes;
pub mod script;
pub mod stream;
pub mod task;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use crate::agents::registry::AgentRole;
use crate::errors::MarketdeskError;
use script::{build_script, ScriptOptions};
use task::{play, SimTask};

pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(400);

/// Shared state of the mock analysis backend.
#[derive(Clone)]
pub struct SimulatorState {
    pub tasks: Arc<DashMap<String, Arc<SimTask>>>,
    slots: Arc<Semaphore>,
    options: ScriptOptions,
    step_delay: Duration,
}

impl SimulatorState {
    pub fn new(max_concurrent: usize, options: ScriptOptions, step_delay: Duration) -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
            slots: Arc::new(Semaphore::new(max_concurrent.max(1))),
            options,
            step_delay,
        }
    }

    /// Register a task and start playing its script in the background.
    pub fn start_task(&self, id: String, symbol: String, team: Vec<AgentRole>) -> Arc<SimTask> {
        let symbol = symbol.to_uppercase();
        let script = build_script(&id, &symbol, &team, &self.options);
        let task = Arc::new(SimTask::new(id.clone(), symbol, team));
        self.tasks.insert(id, task.clone());
        tokio::spawn(play(task.clone(), script, self.step_delay, self.slots.clone()));
        task
    }

    pub fn get(&self, id: &str) -> Option<Arc<SimTask>> {
        self.tasks.get(id).map(|t| t.value().clone())
    }

    pub fn cancel(&self, id: &str) -> bool {
        match self.get(id) {
            Some(task) => {
                task.cancel();
                true
            }
            None => false,
        }
    }
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self::new(2, ScriptOptions::default(), DEFAULT_STEP_DELAY)
    }
}

pub fn build_router(state: SimulatorState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health_check))
        .route("/api/tasks", post(routes::create_task).get(routes::list_tasks))
        .route("/api/tasks/:id", get(routes::get_task))
        .route("/api/tasks/:id/result", get(routes::get_result))
        .route("/api/tasks/:id/cancel", post(routes::cancel_task))
        .route("/ws", get(stream::ws_handler))
        .layer(TraceLayer::new_for_http())
        // browser dashboards connect from their own dev-server origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the simulator until `cancel_token` fires.
pub async fn serve(addr: SocketAddr, state: SimulatorState, cancel_token: CancellationToken) -> Result<(), MarketdeskError> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "Simulator listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(cancel_token.cancelled_owned())
        .await?;
    info!("Simulator stopped");
    Ok(())
}
