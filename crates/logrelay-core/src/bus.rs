//! EventBus: per-level, priority-ordered delivery of [`LogEvent`]s.
//!
//! Listeners for one event run **sequentially**: listener N+1 starts only
//! after listener N's future has resolved, so a durable writer registered at a
//! higher priority always finishes before a network relay sees the same event.
//! Concurrent `emit` calls are not ordered relative to each other.
//!
//! A failing listener never stops the remaining listeners. Once all of them
//! have run, every captured failure is logged and the [`FailurePolicy`]
//! decides what the caller sees.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Deserialize;
use tracing::{debug, error, trace};

use crate::error::{Error, ListenerError, Result};
use crate::types::{LogEvent, LogLevel};

/// Future returned by a listener callback.
pub type ListenerFuture = BoxFuture<'static, anyhow::Result<()>>;

type Callback = Arc<dyn Fn(Arc<LogEvent>) -> ListenerFuture + Send + Sync>;
type Registry = HashMap<LogLevel, Vec<Registered>>;

/// What [`EventBus::emit`] returns when one or more listeners failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Surface the first captured failure.
    #[default]
    FirstError,
    /// Surface every captured failure as [`Error::Listeners`].
    Aggregate,
    /// Log the failures and report success.
    BestEffort,
}

#[derive(Clone)]
struct Registered {
    id: u64,
    priority: i32,
    callback: Callback,
}

struct Inner {
    /// `None` until [`EventBus::initialize`] runs.
    listeners: RwLock<Option<Registry>>,
    next_id: AtomicU64,
    policy: FailurePolicy,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, Option<Registry>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Registry>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a shared listener registry. Clones refer to the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(FailurePolicy::default())
    }
}

impl EventBus {
    /// Create an uninitialized bus.
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                listeners: RwLock::new(None),
                next_id: AtomicU64::new(0),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.inner.policy
    }

    /// Allocate an empty listener set for every level. Repeated calls are
    /// no-ops.
    pub fn initialize(&self) {
        let mut listeners = self.inner.write();
        if listeners.is_none() {
            *listeners = Some(LogLevel::ALL.iter().map(|l| (*l, Vec::new())).collect());
            debug!(policy = ?self.inner.policy, "event bus initialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Register `callback` for `level`. Higher priorities run first; equal
    /// priorities run in registration order.
    pub fn add_listener<F, Fut>(
        &self,
        level: LogLevel,
        callback: F,
        priority: i32,
    ) -> Result<Subscription>
    where
        F: Fn(Arc<LogEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        // The call itself happens on first poll so a synchronous panic is
        // caught alongside the future's.
        let callback = Arc::new(callback);
        let callback: Callback = Arc::new(move |event| -> ListenerFuture {
            let callback = Arc::clone(&callback);
            Box::pin(async move { (*callback)(event).await })
        });

        let mut guard = self.inner.write();
        let registry = guard.as_mut().ok_or(Error::Uninitialized)?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        registry.entry(level).or_default().push(Registered {
            id,
            priority,
            callback,
        });

        debug!(%level, listener_id = id, priority, "registered log listener");

        Ok(Subscription {
            bus: Arc::downgrade(&self.inner),
            level,
            id,
        })
    }

    /// [`add_listener`](Self::add_listener) with priority `0`.
    pub fn add_listener_default<F, Fut>(&self, level: LogLevel, callback: F) -> Result<Subscription>
    where
        F: Fn(Arc<LogEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.add_listener(level, callback, 0)
    }

    /// Deliver `event` to every listener registered for its level.
    pub async fn emit(&self, event: LogEvent) -> Result<()> {
        let mut listeners = {
            let guard = self.inner.read();
            let registry = guard.as_ref().ok_or(Error::Uninitialized)?;
            registry.get(&event.level).cloned().unwrap_or_default()
        };
        // Stable sort: registration order breaks priority ties.
        listeners.sort_by_key(|l| Reverse(l.priority));

        let level = event.level;
        let event = Arc::new(event);
        let mut failures = Vec::new();

        for listener in &listeners {
            trace!(%level, listener_id = listener.id, priority = listener.priority, "delivering log event");

            let outcome = AssertUnwindSafe((listener.callback)(Arc::clone(&event)))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(ListenerError::new(level, e)),
                Err(panic) => failures.push(ListenerError::new(
                    level,
                    anyhow::anyhow!("listener panicked: {}", panic_message(&*panic)),
                )),
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        for failure in &failures {
            error!(
                level = %failure.level,
                error = %failure.source,
                "{}", failure.message
            );
        }

        match self.inner.policy {
            FailurePolicy::FirstError => Err(Error::Listener(failures.swap_remove(0))),
            FailurePolicy::Aggregate => Err(Error::Listeners(failures)),
            FailurePolicy::BestEffort => Ok(()),
        }
    }

    /// Remove every listener for `level`. In-flight dispatches keep their
    /// snapshot.
    pub fn clear_listeners(&self, level: LogLevel) -> Result<()> {
        let mut guard = self.inner.write();
        let registry = guard.as_mut().ok_or(Error::Uninitialized)?;
        if let Some(listeners) = registry.get_mut(&level) {
            listeners.clear();
        }
        debug!(%level, "cleared log listeners");
        Ok(())
    }

    pub fn listener_count(&self, level: LogLevel) -> Result<usize> {
        let guard = self.inner.read();
        let registry = guard.as_ref().ok_or(Error::Uninitialized)?;
        Ok(registry.get(&level).map_or(0, Vec::len))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Removes exactly one registration. Dropping it leaves the listener in place.
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<Inner>,
    level: LogLevel,
    id: u64,
}

impl Subscription {
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// Idempotent; a no-op once the bus is gone.
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut guard = inner.write();
        if let Some(listeners) = guard.as_mut().and_then(|r| r.get_mut(&self.level)) {
            let before = listeners.len();
            listeners.retain(|l| l.id != self.id);
            if listeners.len() != before {
                debug!(level = %self.level, listener_id = self.id, "unregistered log listener");
            }
        }
    }
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("initialized", &self.read().is_some())
            .field("policy", &self.policy)
            .finish()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
