//! StreamClient: consumes a log stream and keeps reconnecting.
//!
//! The client waits `initial_delay` before its first attempt and
//! `reconnect_delay` after every closed or failed connection. Frames that do
//! not decode are dropped with a warning; the connection stays up.

use std::time::Duration;

use anyhow::Context;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::wire::{LogPayload, StreamMessage};

pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct StreamClient {
    pub url: String,
    pub initial_delay: Duration,
    pub reconnect_delay: Duration,
}

enum SessionEnd {
    Closed,
    Cancelled,
    ReceiverGone,
}

impl StreamClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_delay: DEFAULT_INITIAL_DELAY,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_delays(mut self, initial: Duration, reconnect: Duration) -> Self {
        self.initial_delay = initial;
        self.reconnect_delay = reconnect;
        self
    }

    /// Forward decoded payloads into `tx` until `cancel` fires or the
    /// receiving side is dropped.
    pub async fn run(&self, tx: mpsc::Sender<LogPayload>, cancel: CancellationToken) {
        if !pause(self.initial_delay, &cancel).await {
            return;
        }

        loop {
            match self.session(&tx, &cancel).await {
                Ok(SessionEnd::Cancelled) | Ok(SessionEnd::ReceiverGone) => return,
                Ok(SessionEnd::Closed) => {
                    info!(url = %self.url, delay = ?self.reconnect_delay, "log stream closed, reconnecting")
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, delay = ?self.reconnect_delay, "log stream unavailable")
                }
            }

            if tx.is_closed() || !pause(self.reconnect_delay, &cancel).await {
                return;
            }
        }
    }

    async fn session(
        &self,
        tx: &mpsc::Sender<LogPayload>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<SessionEnd> {
        let (socket, _) = tokio::select! {
            _ = cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            connected = tokio_tungstenite::connect_async(self.url.as_str()) => {
                connected.with_context(|| format!("failed to connect to {}", self.url))?
            }
        };
        debug!(url = %self.url, "connected to log stream");

        let (mut write, mut read) = socket.split();
        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    return Ok(SessionEnd::Cancelled);
                }
                frame = read.next() => frame,
            };

            match frame {
                None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::Closed),
                Some(Err(e)) => return Err(e).context("log stream read failed"),
                Some(Ok(Message::Text(text))) => match StreamMessage::decode(text.as_str()) {
                    Ok(StreamMessage::Log(payload)) => {
                        if tx.send(payload).await.is_err() {
                            return Ok(SessionEnd::ReceiverGone);
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping malformed stream frame"),
                },
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Sleep for `delay`; `false` when cancelled first.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
