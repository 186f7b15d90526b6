use feedfilter_core::{ClassifierError, ClassifierSettings, CoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};

#[derive(Debug, Clone)]
pub struct LimiterConfig {
    pub max_requests: u32,
    pub time_window: Duration,
    /// Bucket capacity and the number of requests allowed in flight at once
    pub max_in_flight: u32,
}

impl LimiterConfig {
    pub fn from_settings(settings: &ClassifierSettings) -> Self {
        Self {
            max_requests: settings.requests_per_minute,
            time_window: Duration::from_secs(60),
            max_in_flight: settings.max_in_flight,
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self::from_settings(&ClassifierSettings::default())
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(config: &LimiterConfig) -> Self {
        let capacity = config.max_in_flight as f64;
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate: config.max_requests as f64 / config.time_window.as_secs_f64(),
        }
    }

    /// Takes one token, or returns how long until one is available.
    pub async fn try_acquire(&self) -> Result<(), Duration> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64(
                (1.0 - state.tokens) / self.refill_rate,
            ))
        }
    }

    pub async fn available_tokens(&self) -> f64 {
        let state = self.state.lock().await;
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        (state.tokens + elapsed * self.refill_rate).min(self.capacity)
    }
}

/// Bounds both the request rate and the number of concurrent classifier calls,
/// so a fast-scroll burst cannot fan out into a request storm.
#[derive(Debug)]
pub struct RequestLimiter {
    token_bucket: TokenBucket,
    semaphore: Arc<Semaphore>,
    config: LimiterConfig,
}

impl RequestLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            token_bucket: TokenBucket::new(&config),
            semaphore: Arc::new(Semaphore::new(config.max_in_flight as usize)),
            config,
        }
    }

    pub async fn acquire_permit(&self) -> Result<RequestPermit, CoreError> {
        let start_time = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ClassifierError::LimiterClosed)?;

        while let Err(wait_time) = self.token_bucket.try_acquire().await {
            tracing::debug!("Request rate reached, waiting {:?}", wait_time);
            sleep(wait_time).await;
        }

        Ok(RequestPermit {
            _permit: permit,
            queue_wait_time: start_time.elapsed(),
        })
    }

    pub async fn status(&self) -> LimiterStatus {
        LimiterStatus {
            available_tokens: self.token_bucket.available_tokens().await as u32,
            available_permits: self.semaphore.available_permits(),
            max_in_flight: self.config.max_in_flight as usize,
            requests_per_minute: self.config.max_requests,
        }
    }
}

/// Held for the duration of one request.
#[derive(Debug)]
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
    pub queue_wait_time: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimiterStatus {
    pub available_tokens: u32,
    pub available_permits: usize,
    pub max_in_flight: usize,
    pub requests_per_minute: u32,
}

impl LimiterStatus {
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.available_permits
    }
}
