use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Store error on table '{table}' during {operation}: {message}")]
    Store {
        table: String,
        operation: String,
        message: String,
    },

    #[error("Corrupt store: {0}")]
    CorruptStore(String),
}

impl PipelineError {
    /// Store-level error with enough context for the caller to decide
    /// between retry and abort.
    pub fn store(table: &str, operation: &str, message: impl Into<String>) -> Self {
        Self::Store {
            table: table.to_string(),
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
