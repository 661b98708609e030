//! WebSocket listener using tokio-tungstenite.
//!
//! The protocol is line-free JSON over websocket text frames; no TLS (the
//! endpoint is plain `ws://`).

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use parley_core::{ParleyError, ParleyResult};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// Start the WebSocket listener.
///
/// Returns the bound address (so tests can bind port 0) and a receiver
/// that yields accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> ParleyResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ParleyError::Transport(format!("bind failed: {e}")))?;
    let local_addr = tcp_listener
        .local_addr()
        .map_err(|e| ParleyError::Transport(format!("local_addr failed: {e}")))?;

    info!(addr = %local_addr, "websocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                debug!(remote = %addr, "websocket connection accepted");
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "websocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// Maximum frame size. Generous because image payloads travel inline as
/// base64 data URIs.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Send a text frame over a WebSocket.
pub async fn ws_send_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    text: String,
) -> ParleyResult<()> {
    ws.send(Message::Text(text))
        .await
        .map_err(|e| ParleyError::Transport(format!("websocket send failed: {e}")))
}

/// Receive the next text frame from a WebSocket.
///
/// Returns `None` if the connection is closed. Binary frames are ignored;
/// pings are answered in place.
pub async fn ws_recv_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
) -> ParleyResult<Option<String>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_FRAME_SIZE {
                    return Err(ParleyError::InvalidFrame(format!(
                        "frame too large: {} bytes (max {})",
                        text.len(),
                        MAX_FRAME_SIZE
                    )));
                }
                return Ok(Some(text));
            }
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(_)) => {
                // Ignore binary and other frame kinds.
                continue;
            }
            Some(Err(e)) => {
                return Err(ParleyError::Transport(format!("websocket recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}
