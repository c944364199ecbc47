//! Logger: the producer-facing entry point.
//!
//! Every call fills unset reserved metadata, mirrors the line to the operator
//! log and publishes a [`LogEvent`] on the bus.

use crate::bus::EventBus;
use crate::error::Result;
use crate::types::{LogEvent, LogLevel, LogMetadata, ReservedDefaults};

#[derive(Debug, Clone)]
pub struct Logger {
    bus: EventBus,
    defaults: ReservedDefaults,
}

impl Logger {
    pub fn new(bus: EventBus, defaults: ReservedDefaults) -> Self {
        Self { bus, defaults }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn defaults(&self) -> &ReservedDefaults {
        &self.defaults
    }

    pub async fn info(&self, message: impl Into<String>, metadata: Option<LogMetadata>) -> Result<()> {
        self.emit_at(LogLevel::Info, message, metadata).await
    }

    pub async fn error(&self, message: impl Into<String>, metadata: Option<LogMetadata>) -> Result<()> {
        self.emit_at(LogLevel::Error, message, metadata).await
    }

    pub async fn warn(&self, message: impl Into<String>, metadata: Option<LogMetadata>) -> Result<()> {
        self.emit_at(LogLevel::Warn, message, metadata).await
    }

    pub async fn log(&self, message: impl Into<String>, metadata: Option<LogMetadata>) -> Result<()> {
        self.emit_at(LogLevel::Log, message, metadata).await
    }

    pub async fn debug(&self, message: impl Into<String>, metadata: Option<LogMetadata>) -> Result<()> {
        self.emit_at(LogLevel::Debug, message, metadata).await
    }

    pub async fn assert(&self, message: impl Into<String>, metadata: Option<LogMetadata>) -> Result<()> {
        self.emit_at(LogLevel::Assert, message, metadata).await
    }

    /// Publish one event at `level`, stamped with the current time.
    pub async fn emit_at(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        metadata: Option<LogMetadata>,
    ) -> Result<()> {
        let metadata = metadata.unwrap_or_default().with_defaults(&self.defaults);
        let event = LogEvent::new(level, message).with_metadata(metadata);
        mirror(&event);
        self.bus.emit(event).await
    }
}

fn mirror(event: &LogEvent) {
    let meta = event.metadata.as_ref();
    let agent = meta.and_then(|m| m.agent_id.as_deref()).unwrap_or_default();
    let room = meta.and_then(|m| m.room_id.as_deref()).unwrap_or_default();
    let message = event.message.as_str();

    match event.level {
        LogLevel::Error | LogLevel::Assert => {
            tracing::error!(target: "logrelay::app", level = %event.level, agent, room, "{message}")
        }
        LogLevel::Warn => tracing::warn!(target: "logrelay::app", agent, room, "{message}"),
        LogLevel::Debug => tracing::debug!(target: "logrelay::app", agent, room, "{message}"),
        LogLevel::Info | LogLevel::Log => {
            tracing::info!(target: "logrelay::app", level = %event.level, agent, room, "{message}")
        }
    }
}
