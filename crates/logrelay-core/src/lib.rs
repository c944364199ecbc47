//! logrelay-core: log event dispatch and query core.
//!
//! This crate exposes the dispatch side (event bus, logging facade, sink
//! listener) and the read side (query cache over a durable log sink), plus the
//! shared types and the error taxonomy used by every layer.
//!
//! # Architecture
//!
//! ```text
//! Logger ──► EventBus ──► sink listener (p=1000) ──► LogSink
//!                │
//!                └──────► relay listener (p=500) ──► StreamBroadcaster
//!
//! client ──► QueryCache ──► LogSink
//! ```
//!
//! Listeners for one event run strictly in priority order; the read side never
//! touches the bus.

pub mod bus;
pub mod config;
pub mod error;
pub mod facade;
pub mod query;
pub mod sink;
pub mod store;
pub mod types;

pub use bus::{EventBus, FailurePolicy, Subscription};
pub use error::{Error, ListenerError, Result};
pub use facade::Logger;
pub use query::{Cursor, OrderDirection, OrderedLogQuery, PageRequest, PageResult, QueryCache, RawLogQuery};
pub use store::{LogFilter, LogPage, LogSink, MemoryLogStore};
pub use types::{LogEvent, LogLevel, LogMetadata, LogRecord, ReservedDefaults};
