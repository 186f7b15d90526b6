use crate::error::*;
use tracing::{error, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Storage(e) => {
                error!("Storage error details: {:?}", e);
            }
            CoreError::Classifier(e) => {
                error!("Classifier error details: {:?}", e);
            }
            CoreError::Scan(e) => {
                error!("Scan error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Storage(e) => e.is_retryable(),
            CoreError::Classifier(e) => e.is_retryable(),
            CoreError::Scan(e) => e.is_retryable(),
            CoreError::Config(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Serialization(_) => true,
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Storage(e) => e.user_friendly_message(),
            CoreError::Classifier(e) => e.user_friendly_message(),
            CoreError::Scan(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Storage(_) => "STORAGE".to_string(),
            CoreError::Classifier(_) => "CLASSIFIER".to_string(),
            CoreError::Scan(_) => "SCAN".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
        }
    }
}

impl ErrorExt for StorageError {
    fn log_error(&self) -> &Self {
        error!("StorageError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StorageError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(self, StorageError::ConnectionFailed { .. })
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StorageError::NotConnected { .. } | StorageError::ConnectionFailed { .. } => {
                "Could not open the local store. Please check the database path.".to_string()
            }
            StorageError::CorruptValue { key, .. } => {
                format!("Stored value for '{}' is unreadable. Clearing it may help.", key)
            }
            _ => "Storage error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            StorageError::NotConnected { .. } => "STORE_NOT_CONNECTED".to_string(),
            StorageError::ConnectionFailed { .. } => "STORE_CONNECTION_FAILED".to_string(),
            StorageError::MigrationFailed { .. } => "STORE_MIGRATION_FAILED".to_string(),
            StorageError::CorruptValue { .. } => "STORE_CORRUPT_VALUE".to_string(),
            StorageError::Sql(_) => "STORE_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ClassifierError {
    fn log_error(&self) -> &Self {
        error!("ClassifierError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ClassifierError (warning): {}", self);
        self
    }

    // Every attempt-level failure counts against the attempt budget.
    fn is_retryable(&self) -> bool {
        !matches!(self, ClassifierError::LimiterClosed)
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ClassifierError::BadRequest { .. } => {
                "The classifier rejected the request. It will be retried.".to_string()
            }
            ClassifierError::HttpStatus { status } if *status == 401 || *status == 403 => {
                "The classifier refused the API key. Please update your credentials.".to_string()
            }
            ClassifierError::Transport { .. } => {
                "Could not reach the classifier. Please check your connection.".to_string()
            }
            _ => "Classifier error occurred. The post will stay visible.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ClassifierError::BadRequest { .. } => "CLASSIFIER_BAD_REQUEST".to_string(),
            ClassifierError::HttpStatus { .. } => "CLASSIFIER_HTTP_STATUS".to_string(),
            ClassifierError::Transport { .. } => "CLASSIFIER_TRANSPORT".to_string(),
            ClassifierError::MalformedResponse { .. } => "CLASSIFIER_MALFORMED".to_string(),
            ClassifierError::ContentNotJson { .. } => "CLASSIFIER_CONTENT_NOT_JSON".to_string(),
            ClassifierError::LimiterClosed => "CLASSIFIER_LIMITER_CLOSED".to_string(),
        }
    }
}

impl ErrorExt for ScanError {
    fn log_error(&self) -> &Self {
        error!("ScanError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ScanError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ScanError::InvalidSelector { selector, .. } => {
                format!("The page selector '{}' is invalid.", selector)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ScanError::InvalidSelector { .. } => "SCAN_INVALID_SELECTOR".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::DuplicateTopic { name } => {
                format!("A topic named '{}' already exists.", name)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::DuplicateTopic { .. } => "CONFIG_DUPLICATE_TOPIC".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}
