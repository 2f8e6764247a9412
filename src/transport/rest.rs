use std::time::Duration;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;
use crate::errors::{with_retry, MarketdeskError, RetryConfig};
use crate::models::{CreateTaskRequest, TaskSnapshot, TaskStatus};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response body of `POST /api/tasks`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTask {
    pub id: String,
    pub status: TaskStatus,
}

/// Thin client for the backend's task API.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, MarketdeskError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn create_task(&self, request: &CreateTaskRequest) -> Result<CreatedTask, MarketdeskError> {
        let url = format!("{}/api/tasks", self.base_url);
        let (client, url) = (&self.client, url.as_str());
        with_retry("create_task", &self.retry, || async move {
            let resp = client.post(url).json(request).send().await?;
            let resp = check_status(resp, None).await?;
            Ok(resp.json::<CreatedTask>().await?)
        })
        .await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot, MarketdeskError> {
        let url = format!("{}/api/tasks/{}", self.base_url, task_id);
        let (client, url) = (&self.client, url.as_str());
        with_retry("get_task", &self.retry, || async move {
            debug!(task_id, "Fetching task snapshot");
            let resp = client.get(url).send().await?;
            let resp = check_status(resp, Some(task_id)).await?;
            Ok(resp.json::<TaskSnapshot>().await?)
        })
        .await
    }

    pub async fn get_result(&self, task_id: &str) -> Result<serde_json::Value, MarketdeskError> {
        let url = format!("{}/api/tasks/{}/result", self.base_url, task_id);
        let (client, url) = (&self.client, url.as_str());
        with_retry("get_result", &self.retry, || async move {
            let resp = client.get(url).send().await?;
            let resp = check_status(resp, Some(task_id)).await?;
            Ok(resp.json::<serde_json::Value>().await?)
        })
        .await
    }

    /// Ask the backend to stop a task. Not retried.
    pub async fn cancel_task(&self, task_id: &str) -> Result<(), MarketdeskError> {
        let url = format!("{}/api/tasks/{}/cancel", self.base_url, task_id);
        let resp = self.client.post(&url).send().await?;
        check_status(resp, Some(task_id)).await?;
        Ok(())
    }
}

async fn check_status(
    resp: reqwest::Response,
    task_id: Option<&str>,
) -> Result<reqwest::Response, MarketdeskError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        if let Some(id) = task_id {
            return Err(MarketdeskError::TaskNotFound(id.to_string()));
        }
    }
    if status.is_server_error() {
        let body = resp.text().await.unwrap_or_default();
        return Err(MarketdeskError::Backend(format!("{}: {}", status, body)));
    }
    // other 4xx keep their status so classification treats them as final
    Err(resp.error_for_status().err().map(MarketdeskError::from).unwrap_or_else(|| {
        MarketdeskError::Network(format!("Unexpected status {}", status))
    }))
}
