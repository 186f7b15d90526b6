use crate::prompt::ChatMessage;
use feedfilter_core::{ClassifierError, ClassifierSettings, CoreError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub stream: bool,
    pub response_format: ResponseFormat,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, settings: &ClassifierSettings) -> Self {
        Self {
            messages,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            top_p: settings.top_p,
            stream: false,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatResponse {
    /// Message content of the first choice.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one chat completion request. No retry at this level.
pub trait ChatTransport {
    async fn send(
        &self,
        request: &ChatRequest,
        credential: &str,
    ) -> Result<TransportResponse, CoreError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: Client,
    endpoint: String,
    referer: String,
    title: String,
}

impl HttpTransport {
    pub fn new(settings: &ClassifierSettings) -> Result<Self, CoreError> {
        let mut builder = Client::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            http_client,
            endpoint: settings.endpoint.clone(),
            referer: settings.referer.clone(),
            title: settings.title.clone(),
        })
    }
}

impl ChatTransport for HttpTransport {
    async fn send(
        &self,
        request: &ChatRequest,
        credential: &str,
    ) -> Result<TransportResponse, CoreError> {
        debug!("POST {} ({})", self.endpoint, request.model);
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {}: {}", self.endpoint, e);
                ClassifierError::Transport {
                    reason: e.to_string(),
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ClassifierError::Transport {
            reason: format!("failed to read body: {}", e),
        })?;

        Ok(TransportResponse { status, body })
    }
}

/// Extracts the topic-score JSON embedded in a successful response body.
pub fn parse_content(body: &str) -> Result<serde_json::Value, CoreError> {
    let envelope: ChatResponse =
        serde_json::from_str(body).map_err(|e| ClassifierError::MalformedResponse {
            details: e.to_string(),
        })?;

    let content = envelope
        .first_content()
        .ok_or_else(|| ClassifierError::MalformedResponse {
            details: "response has no choices".to_string(),
        })?;

    serde_json::from_str(content).map_err(|e| {
        ClassifierError::ContentNotJson {
            details: e.to_string(),
        }
        .into()
    })
}
