use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for hybrid retrieval
#[derive(Error, Debug)]
pub enum RagError {
    /// Unknown fusion method or out-of-range parameter
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Caller supplied arguments the operation cannot accept
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// A backing retriever failed
    #[error("Retrieval failed in {backend} backend: {message}")]
    Retrieval { backend: String, message: String },

    /// A suspension point exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The last indexing attempt did not complete on both retrievers
    #[error("Index is not ready: the last indexing attempt failed")]
    IndexNotReady,

    /// Document lookup by id failed
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RagError {
    pub fn retrieval(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::Retrieval {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for hybrid retrieval operations
pub type Result<T> = std::result::Result<T, RagError>;
