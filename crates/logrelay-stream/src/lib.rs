//! logrelay-stream: the network edge of logrelay.
//!
//! - [`broadcaster`]: WebSocket server fanning [`StreamMessage`]s out to every
//!   open client.
//! - [`relay`]: the bus listener that feeds the broadcaster.
//! - [`http`]: `GET /logs` over the query cache.
//! - [`client`]: a reconnecting consumer of the stream, used by
//!   `logrelay watch`.
//! - [`wire`]: the JSON frame format shared by both ends.

pub mod broadcaster;
pub mod client;
pub mod http;
pub mod relay;
pub mod wire;

pub use broadcaster::{ConnectionId, ReadyState, StreamBroadcaster};
pub use client::StreamClient;
pub use http::query_routes;
pub use wire::{LogPayload, StreamMessage, WireError};
