use crate::error::{ConfigError, CoreError};
use crate::types::{default_topics, validate_topics, TopicRule};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub max_attempts: u32,
    pub referer: String,
    pub title: String,
    /// Upper bound on concurrent classifier requests
    pub max_in_flight: u32,
    pub requests_per_minute: u32,
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "meta-llama/llama-3-8b-instruct".to_string(),
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
            max_attempts: 3,
            referer: "https://x.com".to_string(),
            title: "X Content Filter".to_string(),
            max_in_flight: 4,
            requests_per_minute: 120,
            request_timeout_secs: None,
        }
    }
}

impl ClassifierSettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSettings {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            poll_interval_ms: 250,
        }
    }
}

impl TriggerSettings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierSettings,
    pub trigger: TriggerSettings,
    pub storage: StorageSettings,
    /// Seed list used until a topic list has been saved to the store.
    pub topics: Vec<TopicRule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierSettings::default(),
            trigger: TriggerSettings::default(),
            storage: StorageSettings::default(),
            topics: default_topics(),
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(source).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, CoreError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                debug!("No configuration file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let classifier = &self.classifier;
        if classifier.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "classifier.endpoint".to_string(),
            }
            .into());
        }
        if classifier.model.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "classifier.model".to_string(),
            }
            .into());
        }
        if classifier.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.max_attempts".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if classifier.max_in_flight == 0 || classifier.requests_per_minute == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "classifier limits must be greater than zero".to_string(),
            }
            .into());
        }
        if self.trigger.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "trigger.debounce_ms".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        validate_topics(&self.topics)
    }

    pub fn database_url(&self) -> String {
        match &self.storage.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}", default_database_path().display()),
        }
    }
}

pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("feedfilter")
        .join("store.db")
}
