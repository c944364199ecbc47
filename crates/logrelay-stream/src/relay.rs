//! The relay listener: forwards bus events to every live stream client.

use std::sync::Arc;

use logrelay_core::{EventBus, LogEvent, LogLevel, Result, Subscription};
use tracing::trace;

use crate::broadcaster::StreamBroadcaster;
use crate::wire::StreamMessage;

/// Below the persistence listener's default, so an event is stored before it
/// is streamed.
pub const DEFAULT_RELAY_PRIORITY: i32 = 500;

pub fn attach(
    bus: &EventBus,
    broadcaster: &StreamBroadcaster,
    levels: &[LogLevel],
    priority: i32,
) -> Result<Vec<Subscription>> {
    levels
        .iter()
        .map(|&level| {
            let broadcaster = broadcaster.clone();
            bus.add_listener(
                level,
                move |event: Arc<LogEvent>| {
                    let sent = broadcaster.broadcast(&StreamMessage::log(&event));
                    trace!(%level, sent, "relayed log event");
                    async { Ok::<(), anyhow::Error>(()) }
                },
                priority,
            )
        })
        .collect()
}
