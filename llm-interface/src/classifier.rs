use crate::metrics::{AttemptMetrics, MetricsCollector};
use crate::openrouter::{parse_content, ChatRequest, ChatTransport, HttpTransport};
use crate::prompt::build_messages;
use crate::rate_limiter::{LimiterConfig, RequestLimiter};
use crate::retry::{RetryConfig, RetryExecutor};
use feedfilter_core::{
    Analysis, ClassifierError, ClassifierSettings, CoreError, ErrorExt, TopicSnapshot,
};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Scores a piece of post text against the enabled topics.
///
/// Never fails: when every attempt fails the result is an empty analysis.
pub trait Classifier {
    async fn classify(&self, text: &str, topics: &TopicSnapshot, credential: &str) -> Analysis;
}

#[derive(Debug)]
pub struct OpenRouterClassifier<T: ChatTransport = HttpTransport> {
    transport: T,
    settings: ClassifierSettings,
    retry: RetryExecutor,
    limiter: RequestLimiter,
    metrics: MetricsCollector,
}

impl OpenRouterClassifier<HttpTransport> {
    pub fn from_settings(settings: ClassifierSettings) -> Result<Self, CoreError> {
        let transport = HttpTransport::new(&settings)?;
        Ok(Self::new(transport, settings))
    }
}

impl<T: ChatTransport> OpenRouterClassifier<T> {
    pub fn new(transport: T, settings: ClassifierSettings) -> Self {
        Self {
            retry: RetryExecutor::new(RetryConfig::from_settings(&settings)),
            limiter: RequestLimiter::new(LimiterConfig::from_settings(&settings)),
            metrics: MetricsCollector::new(),
            transport,
            settings,
        }
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    async fn attempt(&self, request: &ChatRequest, credential: &str) -> Result<Value, CoreError> {
        let _permit = self.limiter.acquire_permit().await?;
        let start_time = Instant::now();

        let response = self.transport.send(request, credential).await;
        let status_code = response.as_ref().ok().map(|r| r.status);
        let result = response.and_then(|response| match response.status {
            _ if response.is_success() => parse_content(&response.body),
            400 => Err(ClassifierError::BadRequest { status: 400 }.into()),
            status => Err(ClassifierError::HttpStatus { status }.into()),
        });

        self.metrics
            .record_attempt(AttemptMetrics {
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                error_type: result.as_ref().err().map(|e| e.error_code()),
            })
            .await;

        result
    }
}

impl<T: ChatTransport> Classifier for OpenRouterClassifier<T> {
    async fn classify(&self, text: &str, topics: &TopicSnapshot, credential: &str) -> Analysis {
        let request = ChatRequest::new(build_messages(topics.rules(), text), &self.settings);

        match self
            .retry
            .execute("classify", |_| self.attempt(&request, credential))
            .await
        {
            Ok(value) => {
                let analysis = Analysis::from_value(value);
                if let Analysis::Malformed(ref value) = analysis {
                    warn!("Classifier returned non-object JSON: {}", value);
                } else {
                    debug!("Classifier returned {:?}", analysis);
                }
                analysis
            }
            Err(e) => {
                e.log_warn();
                warn!("Max retries reached. Returning empty object.");
                self.metrics.record_exhausted().await;
                Analysis::empty()
            }
        }
    }
}
