//! Error taxonomy shared by every logrelay layer.
//!
//! Validation and initialization errors are local to the call that caused
//! them. Listener and query failures are logged with full context where they
//! happen and surface upward in a simplified form.

use thiserror::Error;

use crate::types::LogLevel;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause carried by a [`ListenerError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single listener failure captured during [`EventBus::emit`](crate::EventBus::emit).
#[derive(Error, Debug)]
#[error("{message}: {source}")]
pub struct ListenerError {
    pub message: String,
    pub level: LogLevel,
    #[source]
    pub source: BoxError,
}

impl ListenerError {
    pub fn new(level: LogLevel, source: impl Into<BoxError>) -> Self {
        Self {
            message: format!("failed to process {level} log event"),
            level,
            source: source.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// An operation was attempted before [`EventBus::initialize`](crate::EventBus::initialize).
    #[error("event bus not initialized")]
    Uninitialized,

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("{} listener(s) failed", .0.len())]
    Listeners(Vec<ListenerError>),

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("failed to start stream transport: {0}")]
    TransportStart(String),

    /// The sink failed; the cause is logged, never exposed.
    #[error("failed to fetch logs")]
    QueryFailed,

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field of a validation error.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Error::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether the caller may retry, possibly with corrected input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::QueryFailed)
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
