//! The persistence listener: writes every emitted event to a [`LogSink`].
//!
//! Registered at a higher priority than the stream relay so an event is
//! durable before any viewer sees it.

use std::sync::Arc;

use anyhow::Context;

use crate::bus::{EventBus, Subscription};
use crate::error::Result;
use crate::store::LogSink;
use crate::types::{LogEvent, LogLevel, ReservedDefaults};

/// Priority the persistence listener is registered with by default.
pub const DEFAULT_SINK_PRIORITY: i32 = 1000;

/// Register the persistence listener on every level.
pub fn attach(
    bus: &EventBus,
    sink: Arc<dyn LogSink>,
    defaults: ReservedDefaults,
    priority: i32,
) -> Result<Vec<Subscription>> {
    let defaults = Arc::new(defaults);

    LogLevel::ALL
        .iter()
        .map(|&level| {
            let sink = Arc::clone(&sink);
            let defaults = Arc::clone(&defaults);
            bus.add_listener(
                level,
                move |event: Arc<LogEvent>| {
                    let sink = Arc::clone(&sink);
                    let defaults = Arc::clone(&defaults);
                    async move { persist(sink.as_ref(), &defaults, &event).await }
                },
                priority,
            )
        })
        .collect()
}

/// Write one event, resolving unset reserved metadata from `defaults`.
pub async fn persist(
    sink: &dyn LogSink,
    defaults: &ReservedDefaults,
    event: &LogEvent,
) -> anyhow::Result<()> {
    let meta = event.metadata.as_ref();
    let agent = resolve(meta.and_then(|m| m.agent_id.as_deref()), &defaults.agent_id);
    let room = resolve(meta.and_then(|m| m.room_id.as_deref()), &defaults.room_id);
    let user = resolve(meta.and_then(|m| m.user_id.as_deref()), &defaults.user_id);

    sink.log(agent, room, user, event.level, &event.message)
        .await
        .with_context(|| format!("failed to persist {} log event", event.level))
}

fn resolve<'a>(value: Option<&'a str>, default: &'a str) -> &'a str {
    value.filter(|v| !v.is_empty()).unwrap_or(default)
}
