//! Wire format of the live stream.
//!
//! One JSON text frame per event:
//!
//! ```json
//! {"type":"log","data":{"level":"info","message":"...","metadata":{...},"timestamp":1700000000000}}
//! ```
//!
//! `metadata` is `null` when the event carried none.

use logrelay_core::{LogEvent, LogLevel, LogMetadata};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("failed to encode stream frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed stream frame: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamMessage {
    Log(LogPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogPayload {
    pub level: LogLevel,
    pub message: String,
    pub metadata: Option<LogMetadata>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl From<&LogEvent> for LogPayload {
    fn from(event: &LogEvent) -> Self {
        Self {
            level: event.level,
            message: event.message.clone(),
            metadata: event.metadata.clone(),
            timestamp: event.timestamp,
        }
    }
}

impl StreamMessage {
    pub fn log(event: &LogEvent) -> Self {
        StreamMessage::Log(LogPayload::from(event))
    }

    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Encode)
    }

    pub fn decode(frame: &str) -> Result<Self, WireError> {
        serde_json::from_str(frame).map_err(WireError::Malformed)
    }
}
