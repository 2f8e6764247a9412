use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use crate::cli::commands::{split_agents, PollArgs};
use crate::cli::live::{conclude, load_config, run_live, LiveOptions};
use crate::errors::MarketdeskError;
use crate::models::CreateTaskRequest;
use crate::monitor::Monitor;
use crate::transport::{poll_task, RestClient};

pub async fn handle_poll(args: PollArgs, config_path: Option<&str>, quiet: bool) -> Result<(), MarketdeskError> {
    let config = load_config(config_path)
        .await?
        .with_analysis(args.symbol.as_deref(), split_agents(args.agents.as_deref()))?;

    let api_url = args.api_url.clone().unwrap_or_else(|| config.api_url());
    let interval = args
        .interval
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.poll_interval());
    let client = RestClient::new(api_url)?;
    let symbol = config.symbol();

    let task_id = match &args.task_id {
        Some(id) => id.clone(),
        None => {
            let request = CreateTaskRequest {
                symbol: symbol.clone(),
                agents: config.team_names(),
            };
            let created = client.create_task(&request).await?;
            info!(task_id = %created.id, status = %created.status.as_str(), "Task created");
            created.id
        }
    };

    let monitor = Monitor::start(&task_id, &symbol, &config);
    let events = monitor.sender()?;
    let token = CancellationToken::new();

    let poller = {
        let (client, task_id, token) = (&client, task_id.as_str(), token.clone());
        async move {
            let snapshot = poll_task(client, task_id, interval, events, token).await?;
            info!(task_id, status = %snapshot.status.as_str(), "Task finished");
            Ok::<(), MarketdeskError>(())
        }
    };

    let cancel_client = client.clone();
    let cancel_id = task_id.clone();
    let outcome = run_live(
        monitor,
        &symbol,
        LiveOptions { json: args.json, quiet },
        poller,
        token,
        move || {
            tokio::spawn(async move {
                if let Err(e) = cancel_client.cancel_task(&cancel_id).await {
                    warn!(task_id = %cancel_id, error = %e, "Could not cancel task on backend");
                }
            });
        },
    )
    .await?;

    conclude(&config, outcome, !args.no_save)
}
