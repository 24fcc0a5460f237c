//! Error types for cardbridge.
//!
//! `BridgeError` covers infrastructure failures (metadata API, mapping store,
//! rewrite oracle). Orchestration outcomes are reported separately through
//! [`crate::models::MigrationError`], which carries a closed [`ErrorKind`]
//! plus the partial query bodies a reviewer needs.
//!
//! [`ErrorKind`]: crate::models::ErrorKind

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the cardbridge library.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Query handling errors
    #[error("Malformed structured query: {message}")]
    QueryParse { message: String },

    #[error("Translation failed: {message}")]
    TranslationFailed { message: String },

    #[error("Rewrite oracle error: {message}")]
    Oracle { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for cardbridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for BridgeError {
    fn from(err: rusqlite::Error) -> Self {
        BridgeError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::Timeout(Duration::from_secs(0))
        } else if let Some(status) = err.status() {
            BridgeError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            BridgeError::Network {
                message: err.to_string(),
                cause: std::error::Error::source(&err).map(|s| s.to_string()),
            }
        }
    }
}

impl BridgeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a database error without an underlying rusqlite error.
    pub fn database(message: impl Into<String>) -> Self {
        BridgeError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Server-side 5xx responses count as transient; 4xx do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Network { .. }
            | BridgeError::Timeout(_)
            | BridgeError::RateLimited { .. } => true,
            BridgeError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error is a rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BridgeError::RateLimited { .. })
    }
}
