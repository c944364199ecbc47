//! Fake log sinks.
//!
//! - [`CountingSink`] wraps a [`MemoryLogStore`] and counts reads, so cache
//!   hits can be told apart from fetches.
//! - [`JournalSink`] records every write into a shared [`Journal`] after a
//!   short delay, which exposes any listener that runs before it finishes.
//! - [`FailingSink`] fails every call.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use logrelay_core::{LogFilter, LogLevel, LogPage, LogSink, MemoryLogStore};

// ---------------------------------------------------------------------------
// CountingSink
// ---------------------------------------------------------------------------

pub struct CountingSink {
    pub inner: MemoryLogStore,
    reads: AtomicUsize,
}

impl CountingSink {
    pub fn new(inner: MemoryLogStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reads: AtomicUsize::new(0),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LogSink for CountingSink {
    async fn log(
        &self,
        agent_id: &str,
        room_id: &str,
        user_id: &str,
        level: LogLevel,
        message: &str,
    ) -> anyhow::Result<()> {
        self.inner.log(agent_id, room_id, user_id, level, message).await
    }

    async fn get_logs(&self, filter: &LogFilter, page: u32, page_size: u32) -> anyhow::Result<LogPage> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_logs(filter, page, page_size).await
    }
}

// ---------------------------------------------------------------------------
// Journal / JournalSink
// ---------------------------------------------------------------------------

/// Ordered record of side effects, shared between fakes and test code.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct JournalSink {
    pub journal: Journal,
    pub store: MemoryLogStore,
    pub write_delay: Duration,
}

impl JournalSink {
    pub fn new(journal: Journal) -> Arc<Self> {
        Arc::new(Self {
            journal,
            store: MemoryLogStore::new(1_000),
            write_delay: Duration::from_millis(20),
        })
    }
}

#[async_trait]
impl LogSink for JournalSink {
    async fn log(
        &self,
        agent_id: &str,
        room_id: &str,
        user_id: &str,
        level: LogLevel,
        message: &str,
    ) -> anyhow::Result<()> {
        tokio::time::sleep(self.write_delay).await;
        self.store.log(agent_id, room_id, user_id, level, message).await?;
        self.journal.push(format!("sink:{message}"));
        Ok(())
    }

    async fn get_logs(&self, filter: &LogFilter, page: u32, page_size: u32) -> anyhow::Result<LogPage> {
        self.store.get_logs(filter, page, page_size).await
    }
}

// ---------------------------------------------------------------------------
// FailingSink
// ---------------------------------------------------------------------------

pub struct FailingSink;

#[async_trait]
impl LogSink for FailingSink {
    async fn log(&self, _: &str, _: &str, _: &str, _: LogLevel, _: &str) -> anyhow::Result<()> {
        anyhow::bail!("sink is read-only")
    }

    async fn get_logs(&self, _: &LogFilter, _: u32, _: u32) -> anyhow::Result<LogPage> {
        anyhow::bail!("connection refused (os error 111)")
    }
}
