//! Query layer: ordered, cursor-paginated log queries over a [`LogSink`],
//! with a short-lived result cache.
//!
//! Requests are validated before any I/O. Results are cached under a
//! canonical key built from `(query, page, pageSize)`; every insertion arms
//! one expiry timer that removes exactly that entry. A lookup that races the
//! timer also treats the entry as gone once its TTL has elapsed.
//!
//! Concurrent first-time requests for the same key are not de-duplicated;
//! both fetch from the sink and the later insertion wins.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::error::{Error, Result};
use crate::store::{LogFilter, LogSink};
use crate::types::{LogLevel, LogRecord};

pub const MIN_PAGE: u32 = 1;
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(5000);

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for OrderDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(Error::validation(
                "orderBy",
                format!("expected \"asc\" or \"desc\", got {other:?}"),
            )),
        }
    }
}

/// A [`LogFilter`] plus ordering and an optional timestamp cursor.
///
/// Sinks count pages from the newest match, so only descending cursor walks
/// page through history. An ascending query with a cursor returns the newest
/// `pageSize` records at or after the cursor, not the ones just after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderedLogQuery {
    #[serde(flatten)]
    pub filter: LogFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_timestamp: Option<i64>,
}

impl OrderedLogQuery {
    pub fn order(&self) -> OrderDirection {
        self.order_by.unwrap_or_default()
    }

    pub fn descending(mut self) -> Self {
        self.order_by = Some(OrderDirection::Desc);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.order_by = Some(OrderDirection::Asc);
        self
    }

    pub fn after_cursor(mut self, timestamp: i64) -> Self {
        self.cursor_timestamp = Some(timestamp);
        self
    }

    /// The filter handed to the sink. The cursor is an upper bound on
    /// `endTimestamp` for descending queries and a lower bound on
    /// `startTimestamp` otherwise, replacing any bound of the same name.
    pub fn sink_filter(&self) -> LogFilter {
        let mut filter = self.filter.clone();
        if let Some(cursor) = self.cursor_timestamp {
            match self.order() {
                OrderDirection::Desc => filter.end_timestamp = Some(cursor),
                OrderDirection::Asc => filter.start_timestamp = Some(cursor),
            }
        }
        filter
    }
}

/// Untyped query parameters as they arrive from a transport.
///
/// [`RawLogQuery::parse`] is the validation boundary for string input: every
/// rejection names the offending field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogQuery {
    pub agent_id: Option<String>,
    pub room_id: Option<String>,
    pub user_id: Option<String>,
    pub level: Option<String>,
    pub start_timestamp: Option<String>,
    pub end_timestamp: Option<String>,
    pub order_by: Option<String>,
    pub cursor_timestamp: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

/// A parsed request: the query plus its page coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: OrderedLogQuery,
    pub page: u32,
    pub page_size: u32,
}

impl RawLogQuery {
    pub fn parse(self, default_page_size: u32) -> Result<PageRequest> {
        let level = self
            .level
            .as_deref()
            .map(LogLevel::from_str)
            .transpose()?;

        let query = OrderedLogQuery {
            filter: LogFilter {
                agent_id: self.agent_id,
                room_id: self.room_id,
                user_id: self.user_id,
                level,
                start_timestamp: parse_timestamp("startTimestamp", self.start_timestamp)?,
                end_timestamp: parse_timestamp("endTimestamp", self.end_timestamp)?,
            },
            order_by: self.order_by.as_deref().map(str::parse).transpose()?,
            cursor_timestamp: parse_timestamp("cursorTimestamp", self.cursor_timestamp)?,
        };

        let page = match self.page {
            Some(raw) => parse_count("page", &raw)?,
            None => MIN_PAGE,
        };
        let page_size = match self.page_size {
            Some(raw) => parse_count("pageSize", &raw)?,
            None => default_page_size,
        };

        Ok(PageRequest {
            query,
            page,
            page_size,
        })
    }
}

fn parse_timestamp(field: &'static str, raw: Option<String>) -> Result<Option<i64>> {
    raw.map(|s| {
        s.trim()
            .parse::<i64>()
            .map_err(|_| Error::validation(field, format!("expected an integer, got {s:?}")))
    })
    .transpose()
}

/// Negative counts collapse to zero so range validation reports them.
fn parse_count(field: &'static str, raw: &str) -> Result<u32> {
    let n = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::validation(field, format!("expected an integer, got {raw:?}")))?;
    Ok(u32::try_from(n.max(0)).unwrap_or(u32::MAX))
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Continuation boundaries of a returned page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<i64>,
}

impl Cursor {
    /// Computed from the already-ordered records: `prev` is the first
    /// record's timestamp, `next` the last one's.
    pub fn from_records(records: &[LogRecord]) -> Self {
        Self {
            prev: records.first().map(LogRecord::timestamp),
            next: records.last().map(LogRecord::timestamp),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub data: Vec<LogRecord>,
    pub page: u32,
    pub page_size: u32,
    pub cursor: Cursor,
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

struct CacheEntry {
    value: Arc<PageResult>,
    expires_at: Instant,
    generation: u64,
}

type Entries = Arc<Mutex<HashMap<String, CacheEntry>>>;

fn lock(entries: &Mutex<HashMap<String, CacheEntry>>) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct QueryCache {
    sink: Arc<dyn LogSink>,
    ttl: Duration,
    entries: Entries,
    generation: AtomicU64,
}

impl QueryCache {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self::with_ttl(sink, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(sink: Arc<dyn LogSink>, ttl: Duration) -> Self {
        Self {
            sink,
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch one ordered page. Must be called from within a Tokio runtime:
    /// each cache insertion spawns its expiry timer.
    pub async fn get_ordered_logs(
        &self,
        query: &OrderedLogQuery,
        page: u32,
        page_size: u32,
    ) -> Result<Arc<PageResult>> {
        validate(page, page_size)?;

        let key = cache_key(query, page, page_size);
        if let Some(hit) = self.lookup(&key) {
            trace!(%key, "query cache hit");
            return Ok(hit);
        }

        let result = match self.fetch(query, page, page_size).await {
            Ok(result) => Arc::new(result),
            Err(e) => {
                error!(error = ?e, page, page_size, "failed to fetch ordered logs");
                return Err(Error::QueryFailed);
            }
        };

        self.insert(key, Arc::clone(&result));
        Ok(result)
    }

    async fn fetch(
        &self,
        query: &OrderedLogQuery,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<PageResult> {
        let filter = query.sink_filter();
        let mut fetched = self.sink.get_logs(&filter, page, page_size).await?;

        // Sinks return ascending pages.
        if query.order() == OrderDirection::Desc {
            fetched.data.reverse();
        }

        let cursor = Cursor::from_records(&fetched.data);
        Ok(PageResult {
            data: fetched.data,
            page: fetched.page,
            page_size: fetched.page_size,
            cursor,
        })
    }

    fn lookup(&self, key: &str) -> Option<Arc<PageResult>> {
        let mut entries = lock(&self.entries);
        let live = entries.get(key).map(|e| e.expires_at > Instant::now())?;
        if live {
            entries.get(key).map(|e| Arc::clone(&e.value))
        } else {
            entries.remove(key);
            None
        }
    }

    fn insert(&self, key: String, value: Arc<PageResult>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.entries).insert(
            key.clone(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
                generation,
            },
        );

        let entries = Arc::downgrade(&self.entries);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let Some(entries) = entries.upgrade() else {
                return;
            };
            let mut entries = lock(&entries);
            if entries.get(&key).is_some_and(|e| e.generation == generation) {
                entries.remove(&key);
                debug!(%key, "query cache entry expired");
            }
        });
    }

    /// Number of entries currently held, expired-but-unswept ones included.
    pub fn cached_entries(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Drop every cached page. Pending expiry timers become no-ops.
    pub fn invalidate_all(&self) {
        lock(&self.entries).clear();
    }
}

fn validate(page: u32, page_size: u32) -> Result<()> {
    if page < MIN_PAGE {
        return Err(Error::validation(
            "page",
            format!("must be greater than or equal to {MIN_PAGE}"),
        ));
    }
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(Error::validation(
            "pageSize",
            format!("must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"),
        ));
    }
    Ok(())
}

/// JSON objects built by `serde_json::json!` keep keys sorted, so equal
/// triples always produce equal keys.
fn cache_key(query: &OrderedLogQuery, page: u32, page_size: u32) -> String {
    serde_json::json!({
        "query": query,
        "page": page,
        "pageSize": page_size,
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
