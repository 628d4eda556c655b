//! Error types for docindex
//!
//! Provides the error taxonomy shared by the index adapter:
//! - Configuration errors (fail fast, never retried)
//! - Transport and engine errors (retried on read paths when transient)
//! - Chunk-level data errors (logged and skipped by the pipeline)
//! - Error codes for machine-readable identification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using IndexError
pub type Result<T> = std::result::Result<T, IndexError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigurationError,
    InvalidIndexType,

    // Engine errors (2xxx)
    TransportError,
    EngineError,
    EngineUnavailable,

    // Data errors (3xxx)
    InvalidChunk,
    SerializationError,

    // Internal errors (9xxx)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::InvalidIndexType => 1002,

            ErrorCode::TransportError => 2001,
            ErrorCode::EngineError => 2002,
            ErrorCode::EngineUnavailable => 2003,

            ErrorCode::InvalidChunk => 3001,
            ErrorCode::SerializationError => 3002,

            ErrorCode::InternalError => 9001,
        }
    }
}

/// Index adapter error types
#[derive(Error, Debug)]
pub enum IndexError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid document index type: {index_type}")]
    InvalidIndexType { index_type: String },

    // Engine errors
    #[error("Search engine transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Search engine returned {status}: {message}")]
    Engine { status: u16, message: String },

    #[error("Search engine not ready: {message}")]
    EngineUnavailable { message: String },

    // Data errors
    #[error("Invalid chunk {chunk_id}: {message}")]
    InvalidChunk { chunk_id: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl IndexError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            IndexError::Configuration { .. } => ErrorCode::ConfigurationError,
            IndexError::InvalidIndexType { .. } => ErrorCode::InvalidIndexType,
            IndexError::Transport(_) => ErrorCode::TransportError,
            IndexError::Engine { .. } => ErrorCode::EngineError,
            IndexError::EngineUnavailable { .. } => ErrorCode::EngineUnavailable,
            IndexError::InvalidChunk { .. } => ErrorCode::InvalidChunk,
            IndexError::Serialization(_) => ErrorCode::SerializationError,
            IndexError::Internal { .. } | IndexError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a retry of the same request could succeed.
    ///
    /// Timeouts, connection failures, throttling (429) and engine-side 5xx
    /// responses are transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexError::Transport(err) => {
                err.is_timeout()
                    || err.is_connect()
                    || err.is_request()
                    || err.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            IndexError::Engine { status, .. } => *status == 429 || *status >= 500,
            IndexError::EngineUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Configuration problems are never recoverable at runtime
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            IndexError::Configuration { .. } | IndexError::InvalidIndexType { .. }
        )
    }

    /// Shorthand for building an engine error from a status and body
    pub fn engine(status: u16, message: impl Into<String>) -> Self {
        IndexError::Engine {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for building a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        IndexError::Configuration {
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for IndexError {
    fn from(err: config::ConfigError) -> Self {
        IndexError::Configuration {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for IndexError {
    fn from(err: validator::ValidationErrors) -> Self {
        IndexError::Configuration {
            message: err.to_string(),
        }
    }
}
