use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl From<sqlx::Error> for CoreError {
    fn from(error: sqlx::Error) -> Self {
        CoreError::Storage(StorageError::Sql(error))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Store not connected: {store}")]
    NotConnected { store: String },

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Stored value for {key} is not valid JSON: {reason}")]
    CorruptValue { key: String, reason: String },

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Error, Debug, Clone)]
pub enum ClassifierError {
    #[error("Classifier rejected the request (status {status})")]
    BadRequest { status: u16 },

    #[error("Classifier returned status {status}")]
    HttpStatus { status: u16 },

    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Malformed classifier response: {details}")]
    MalformedResponse { details: String },

    #[error("Classifier content is not JSON: {details}")]
    ContentNotJson { details: String },

    #[error("Request limiter closed")]
    LimiterClosed,
}

#[derive(Error, Debug, Clone)]
pub enum ScanError {
    #[error("Invalid selector {selector}: {reason}")]
    InvalidSelector { selector: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Duplicate topic: {name}")]
    DuplicateTopic { name: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
