use std::time::Duration;
use std::future::Future;

use super::classification::ErrorClassification;
use super::types::MarketdeskError;
use tracing::{warn, info};

impl ErrorClassification {
    /// Back-off before the next attempt (`attempt` is 0-indexed).
    ///
    /// An overloaded backend gets a linear 5s step up to a minute. Everything
    /// else doubles from one second with up to a second of jitter, capped at 30s.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if self.error_type == "BackendError" {
            let secs = 5 * (u64::from(attempt) + 1);
            return Duration::from_secs(secs.min(60));
        }
        let doubled = 2.0_f64.powi(attempt.min(16) as i32);
        Duration::from_secs_f64((doubled + rand::random::<f64>()).min(30.0))
    }
}

/// Retry configuration for REST calls against the analysis backend.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub fail_fast: bool,
}

impl RetryConfig {
    fn attempts(&self) -> u32 {
        if self.fail_fast {
            1
        } else {
            self.max_retries.saturating_add(1)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fail_fast: false,
        }
    }
}

/// Run `factory` until it succeeds, the error is not retryable, or the
/// attempt budget runs out. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, MarketdeskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MarketdeskError>>,
{
    let budget = config.attempts();
    let mut attempt = 0;

    loop {
        let err = match factory().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempts = attempt + 1, "Backend call recovered");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let class = err.classify();
        if !class.retryable {
            warn!(operation = operation_name, error_type = class.error_type, error = %err, "Giving up on non-retryable error");
            return Err(err);
        }
        if attempt + 1 >= budget {
            warn!(operation = operation_name, attempts = budget, error = %err, "Retry budget spent");
            return Err(err);
        }

        let delay = class.retry_delay(attempt);
        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            of = budget,
            error_type = class.error_type,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Backend call failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
