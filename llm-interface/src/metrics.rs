use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifierMetrics {
    /// Every request sent, retries included
    pub total_attempts: u64,
    pub successful_calls: u64,
    pub failed_attempts: u64,
    /// Calls that ran out of attempts and returned an empty result
    pub exhausted_calls: u64,
    pub bad_request_responses: u64,
    pub average_response_time: Duration,
}

#[derive(Debug, Clone)]
pub struct AttemptMetrics {
    pub status_code: Option<u16>,
    pub response_time: Duration,
    pub success: bool,
    pub error_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<ClassifierMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_attempt(&self, attempt: AttemptMetrics) {
        let mut metrics = self.metrics.write().await;
        metrics.total_attempts += 1;
        if attempt.success {
            metrics.successful_calls += 1;
        } else {
            metrics.failed_attempts += 1;
        }
        if attempt.status_code == Some(400) {
            metrics.bad_request_responses += 1;
        }

        let previous_total = metrics.average_response_time * (metrics.total_attempts - 1) as u32;
        metrics.average_response_time =
            (previous_total + attempt.response_time) / metrics.total_attempts as u32;
    }

    pub async fn record_exhausted(&self) {
        self.metrics.write().await.exhausted_calls += 1;
    }

    pub async fn get_metrics(&self) -> ClassifierMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset_metrics(&self) {
        *self.metrics.write().await = ClassifierMetrics::default();
    }
}
