//! Core types for logrelay-core.
//!
//! This module defines the data structures shared across the dispatch and
//! query layers: the emitted [`LogEvent`] with its [`LogLevel`] and typed
//! [`LogMetadata`], and the durable [`LogRecord`] returned by a log sink.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Log severity level. Serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
    Warn,
    Log,
    Debug,
    Assert,
}

impl LogLevel {
    /// Every level, in the order listener sets are allocated.
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Info,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Log,
        LogLevel::Debug,
        LogLevel::Assert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Log => "log",
            LogLevel::Debug => "debug",
            LogLevel::Assert => "assert",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "log" => Ok(LogLevel::Log),
            "debug" => Ok(LogLevel::Debug),
            "assert" => Ok(LogLevel::Assert),
            other => Err(Error::validation("level", format!("unknown log level {other:?}"))),
        }
    }
}

/// Metadata attached to a [`LogEvent`].
///
/// The three reserved keys are typed; everything else lands in `extra` and is
/// flattened back next to them on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl LogMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build metadata from an untyped JSON value.
    ///
    /// `null` yields empty metadata. Anything other than an object, or a
    /// reserved key holding a non-string, is rejected.
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| Error::validation("metadata", e.to_string())),
            other => Err(Error::validation(
                "metadata",
                format!("expected an object, got {other}"),
            )),
        }
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Fill missing or empty reserved keys from `defaults`.
    pub fn with_defaults(mut self, defaults: &ReservedDefaults) -> Self {
        fill(&mut self.agent_id, &defaults.agent_id);
        fill(&mut self.room_id, &defaults.room_id);
        fill(&mut self.user_id, &defaults.user_id);
        self
    }
}

fn fill(slot: &mut Option<String>, default: &str) {
    if slot.as_deref().map_or(true, str::is_empty) {
        *slot = Some(default.to_string());
    }
}

/// Values used for reserved metadata keys the producer left unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedDefaults {
    pub agent_id: String,
    pub room_id: String,
    pub user_id: String,
}

impl ReservedDefaults {
    pub fn for_agent(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            room_id: "default".to_string(),
            user_id: "system".to_string(),
        }
    }
}

/// A structured log event as published on the [`EventBus`](crate::EventBus).
///
/// Events are immutable once emitted; listeners receive them behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: LogLevel,
    pub message: String,
    pub metadata: Option<LogMetadata>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl LogEvent {
    /// Create an event stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_metadata(mut self, metadata: LogMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// A persisted log record as returned by a [`LogSink`](crate::LogSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: u64,
    pub agent_id: String,
    pub room_id: String,
    pub user_id: String,
    pub level: LogLevel,
    pub message: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
}

impl LogRecord {
    /// The timestamp cursors are computed from.
    pub fn timestamp(&self) -> i64 {
        self.start_timestamp
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
