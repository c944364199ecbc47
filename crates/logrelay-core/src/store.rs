//! Store: the durable log sink contract and an in-memory ring buffer that
//! implements it.
//!
//! The core never decides how logs are physically stored; it talks to a
//! [`LogSink`]. [`MemoryLogStore`] is the sink the binary and the test
//! harnesses run against.
//!
//! # Paging
//!
//! Pages are counted from the newest matching record backwards: page 1 holds
//! the most recent `page_size` matches. Within a page, records are returned in
//! ascending time order.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{LogLevel, LogRecord};

/// Record filter understood by every sink. All bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// Lower bound on `startTimestamp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<i64>,
    /// Upper bound on `endTimestamp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<i64>,
}

impl LogFilter {
    pub fn matches(&self, record: &LogRecord) -> bool {
        fn eq(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }

        eq(&self.agent_id, &record.agent_id)
            && eq(&self.room_id, &record.room_id)
            && eq(&self.user_id, &record.user_id)
            && self.level.map_or(true, |l| l == record.level)
            && self.start_timestamp.map_or(true, |t| record.start_timestamp >= t)
            && self.end_timestamp.map_or(true, |t| record.end_timestamp <= t)
    }
}

/// One page as returned by a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub data: Vec<LogRecord>,
    pub page: u32,
    pub page_size: u32,
}

/// The durable store the pipeline persists to and queries from.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn log(
        &self,
        agent_id: &str,
        room_id: &str,
        user_id: &str,
        level: LogLevel,
        message: &str,
    ) -> anyhow::Result<()>;

    async fn get_logs(&self, filter: &LogFilter, page: u32, page_size: u32)
        -> anyhow::Result<LogPage>;
}

// ---------------------------------------------------------------------------
// MemoryLogStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Ring {
    records: VecDeque<LogRecord>,
    next_id: u64,
}

/// Bounded in-memory sink. When full, the oldest record is evicted.
pub struct MemoryLogStore {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl MemoryLogStore {
    /// `capacity` is clamped to at least one record.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ring: Mutex::new(Ring::default()),
        }
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record with an explicit timestamp and return it.
    pub fn record_at(
        &self,
        timestamp: i64,
        agent_id: &str,
        room_id: &str,
        user_id: &str,
        level: LogLevel,
        message: &str,
    ) -> LogRecord {
        let mut ring = self.ring();
        ring.next_id += 1;
        let record = LogRecord {
            id: ring.next_id,
            agent_id: agent_id.to_string(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            level,
            message: message.to_string(),
            start_timestamp: timestamp,
            end_timestamp: timestamp,
        };
        ring.records.push_back(record.clone());
        while ring.records.len() > self.capacity {
            ring.records.pop_front();
        }
        record
    }

    /// All retained records in insertion order.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.ring().records.iter().cloned().collect()
    }
}

#[async_trait]
impl LogSink for MemoryLogStore {
    async fn log(
        &self,
        agent_id: &str,
        room_id: &str,
        user_id: &str,
        level: LogLevel,
        message: &str,
    ) -> anyhow::Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.record_at(now, agent_id, room_id, user_id, level, message);
        Ok(())
    }

    async fn get_logs(
        &self,
        filter: &LogFilter,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<LogPage> {
        let mut matching: Vec<LogRecord> = {
            let ring = self.ring();
            ring.records.iter().filter(|r| filter.matches(r)).cloned().collect()
        };
        matching.sort_by_key(|r| (r.start_timestamp, r.id));

        let size = page_size.max(1) as usize;
        let skip = (page.max(1) as usize - 1).saturating_mul(size);
        let end = matching.len().saturating_sub(skip);
        let start = end.saturating_sub(size);

        Ok(LogPage {
            data: matching.drain(start..end).collect(),
            page,
            page_size,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
