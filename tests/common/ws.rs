//! WebSocket client helpers built on `tokio-tungstenite`.

use std::net::SocketAddr;
use std::time::Duration;

use futures::StreamExt;
use logrelay_stream::{LogPayload, StreamBroadcaster, StreamMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a helper waits before declaring a frame or connection missing.
pub const WS_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect to the stream endpoint at `path` on a loopback address.
pub async fn connect(addr: SocketAddr, path: &str) -> WsClient {
    let url = format!("ws://127.0.0.1:{}{path}", addr.port());
    let (client, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("websocket handshake should succeed");
    client
}

/// Wait until the broadcaster tracks exactly `n` connections.
pub async fn wait_for_connections(broadcaster: &StreamBroadcaster, n: usize) {
    tokio::time::timeout(WS_TIMEOUT, async {
        while broadcaster.connection_count() != n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!(
            "expected {n} connections, broadcaster has {}",
            broadcaster.connection_count()
        )
    });
}

/// Next log payload on `client`, skipping non-text frames.
pub async fn next_payload(client: &mut WsClient) -> LogPayload {
    tokio::time::timeout(WS_TIMEOUT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    let StreamMessage::Log(payload) =
                        StreamMessage::decode(text.as_str()).expect("server frames must decode");
                    return payload;
                }
                Some(Ok(_)) => continue,
                other => panic!("stream ended before a log frame arrived: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a log frame")
}

/// Whether `client` sees a close frame (or end of stream) before timing out.
pub async fn closes(client: &mut WsClient) -> bool {
    tokio::time::timeout(WS_TIMEOUT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap_or(false)
}
