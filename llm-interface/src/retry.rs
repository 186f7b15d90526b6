use feedfilter_core::{ClassifierSettings, CoreError, ErrorExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Pause between attempts. Zero retries immediately.
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    pub fn from_settings(settings: &ClassifierSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    Immediate,
    AfterDelay(Duration),
    NoRetry,
}

pub fn get_retry_strategy(error: &CoreError, config: &RetryConfig) -> RetryStrategy {
    if !error.is_retryable() {
        RetryStrategy::NoRetry
    } else if config.retry_delay.is_zero() {
        RetryStrategy::Immediate
    } else {
        RetryStrategy::AfterDelay(config.retry_delay)
    }
}

/// Runs an operation up to `max_attempts` times and hands back the last error.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// The operation receives the zero-based attempt number.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let start_time = Instant::now();
            let error = match operation(attempt).await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            attempt += 1;
            warn!(
                "Attempt {} of {} failed for {} after {:?}: {}",
                attempt,
                max_attempts,
                operation_name,
                start_time.elapsed(),
                error
            );

            if attempt >= max_attempts {
                debug!("Max retry attempts reached for {}", operation_name);
                return Err(error);
            }

            match get_retry_strategy(&error, &self.config) {
                RetryStrategy::NoRetry => {
                    debug!("Not retrying {} due to error type: {}", operation_name, error);
                    return Err(error);
                }
                RetryStrategy::Immediate => {}
                RetryStrategy::AfterDelay(delay) => sleep(delay).await,
            }
        }
    }
}
