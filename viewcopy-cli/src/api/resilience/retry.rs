//! Retry policy with exponential backoff

use anyhow::Result;
use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use super::config::RetryConfig;
use crate::api::warehouse::ApiError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `request` until it succeeds, fails with a non-retryable error,
    /// or the attempt budget is spent.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut request: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match request().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(err) if attempt < self.config.max_attempts && is_retryable(&err) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                        operation, attempt, self.config.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Backoff before the retry that follows `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base_ms = self.config.base_delay().as_millis() as f64;
        let max_ms = self.config.max_delay().as_millis() as f64;
        // Capped in f64 so a large multiplier cannot overflow the Duration
        let capped = (base_ms * self.config.backoff_multiplier.powi(exponent)).min(max_ms);
        let millis = if self.config.jitter {
            capped * rand::rng().random_range(0.5..=1.0)
        } else {
            capped
        };
        Duration::from_millis(millis as u64)
    }
}

/// Throttling, server errors and transport failures are worth another try
fn is_retryable(err: &anyhow::Error) -> bool {
    if let Some(api_err) = err.downcast_ref::<ApiError>() {
        return api_err.is_retryable();
    }
    if let Some(http_err) = err.downcast_ref::<reqwest::Error>() {
        return http_err.is_timeout() || http_err.is_connect() || http_err.is_request();
    }
    false
}
