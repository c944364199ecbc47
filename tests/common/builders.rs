//! Test builders: ergonomic constructors for events, stores, configs and
//! pipelines.
//!
//! These builders are designed for readability in test assertions, not for
//! production use. They panic on invalid input rather than returning `Result`.

use std::sync::Arc;

use logrelay::Pipeline;
use logrelay_core::config::Config;
use logrelay_core::{LogEvent, LogLevel, LogMetadata, LogRecord, MemoryLogStore, PageResult};

// ---------------------------------------------------------------------------
// EventBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`LogEvent`] fixtures.
///
/// # Example
///
/// ```rust
/// let event = EventBuilder::new("timeout connecting to db")
///     .level(LogLevel::Error)
///     .room("ops")
///     .field("request_id", "req-abc123")
///     .at(1_700_000_000_000)
///     .build();
/// ```
pub struct EventBuilder {
    level: LogLevel,
    message: String,
    metadata: Option<LogMetadata>,
    timestamp: Option<i64>,
}

impl EventBuilder {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            message: message.into(),
            metadata: None,
            timestamp: None,
        }
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn agent(mut self, agent_id: &str) -> Self {
        self.metadata = Some(self.metadata.unwrap_or_default().agent(agent_id));
        self
    }

    pub fn room(mut self, room_id: &str) -> Self {
        self.metadata = Some(self.metadata.unwrap_or_default().room(room_id));
        self
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.metadata = Some(self.metadata.unwrap_or_default().user(user_id));
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata = Some(self.metadata.unwrap_or_default().field(key, value));
        self
    }

    pub fn at(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> LogEvent {
        let mut event = LogEvent::new(self.level, self.message);
        event.metadata = self.metadata;
        if let Some(ts) = self.timestamp {
            event.timestamp = ts;
        }
        event
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// A store holding one `info` record per timestamp, in the given order.
/// Messages are `t<timestamp>`.
pub fn seeded_store(timestamps: &[i64]) -> MemoryLogStore {
    let store = MemoryLogStore::new(10_000);
    for ts in timestamps {
        store.record_at(*ts, "agent", "room", "user", LogLevel::Info, &format!("t{ts}"));
    }
    store
}

/// Timestamps of a result page, in returned order.
pub fn stamps(result: &PageResult) -> Vec<i64> {
    result.data.iter().map(LogRecord::timestamp).collect()
}

// ---------------------------------------------------------------------------
// Config / pipeline
// ---------------------------------------------------------------------------

/// Embedded defaults bound to an ephemeral loopback port.
pub fn test_config() -> Config {
    let mut config = Config::defaults();
    config.stream.host = "127.0.0.1".to_string();
    config.stream.port = 0;
    config
}

/// A pipeline over a fresh in-memory store, not yet started.
pub fn pipeline_with_store(config: Config) -> (Pipeline, Arc<MemoryLogStore>) {
    let store = Arc::new(MemoryLogStore::new(config.store.capacity));
    let pipeline = Pipeline::build(config, store.clone()).expect("pipeline should build");
    (pipeline, store)
}
