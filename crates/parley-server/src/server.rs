//! Core server: the session gateway.
//!
//! Accepts websocket connections and runs each through the per-connection
//! state machine `CONNECTED → AUTHENTICATED → CLOSED`. Owns the durable
//! stores, the live-connection registry, and the broadcast relay.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use parley_core::{
    decode_client_frame, encode_frame, normalize_username, ClientFrame, FrameError, Message,
    ParleyError, ParleyResult, ServerFrame, User,
};

use crate::config::ServerConfig;
use crate::registry::ConnectionRegistry;
use crate::relay::BroadcastRelay;
use crate::store::{MessageLog, UserDirectory};
use crate::transport::{self, WebSocketConnection};

/// Per-connection session state, present once AUTH has succeeded.
struct Session {
    conn_id: u64,
    username: String,
}

/// The parley server instance.
pub struct ChatServer {
    config: ServerConfig,
    directory: Arc<UserDirectory>,
    log: Arc<MessageLog>,
    registry: Arc<ConnectionRegistry>,
    relay: Arc<BroadcastRelay>,
}

impl ChatServer {
    /// Open the durable stores and assemble the server.
    pub fn new(config: ServerConfig) -> ParleyResult<Self> {
        let directory = Arc::new(UserDirectory::open(&config.users_path())?);
        let log = Arc::new(MessageLog::open(&config.messages_path())?);
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(BroadcastRelay::new(log.clone(), registry.clone()));

        Ok(Self {
            config,
            directory,
            log,
            registry,
            relay,
        })
    }

    /// Start listening and serving connections in the background.
    ///
    /// Returns the bound address (useful when configured with port 0) and
    /// the accept-loop task handle.
    pub async fn spawn(self) -> ParleyResult<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let bind: SocketAddr = format!("0.0.0.0:{}", self.config.port)
            .parse()
            .map_err(|e| ParleyError::Other(format!("invalid address: {e}")))?;

        let (local_addr, mut conn_rx) = transport::start_listener(bind).await?;
        let server = Arc::new(self);

        info!(addr = %local_addr, "parley-server ready");

        let handle = tokio::spawn(async move {
            while let Some(conn) = conn_rx.recv().await {
                let srv = server.clone();
                tokio::spawn(async move {
                    let remote = conn.remote_addr;
                    if let Err(e) = srv.handle_connection(conn).await {
                        debug!(remote = %remote, error = %e, "connection ended with error");
                    }
                });
            }
        });

        Ok((local_addr, handle))
    }

    /// Drive one connection from accept to close.
    async fn handle_connection(&self, mut conn: WebSocketConnection) -> ParleyResult<()> {
        let remote = conn.remote_addr;
        debug!(remote = %remote, "handling connection");

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerFrame>(64);
        let mut session: Option<Session> = None;

        let result = loop {
            tokio::select! {
                Some(frame) = outbound_rx.recv() => {
                    let text = match encode_frame(&frame) {
                        Ok(text) => text,
                        Err(e) => break Err(e),
                    };
                    if let Err(e) = transport::ws_send_text(&mut conn.ws_stream, text).await {
                        break Err(e);
                    }
                }

                recv = transport::ws_recv_text(&mut conn.ws_stream) => {
                    match recv {
                        Ok(Some(text)) => {
                            if let Err(e) = self
                                .dispatch_frame(&text, &mut session, &outbound_tx, remote)
                                .await
                            {
                                break Err(e);
                            }
                        }
                        Ok(None) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        // CLOSED: deregister from any state.
        if let Some(session) = session {
            self.registry.deregister(session.conn_id).await;
            info!(remote = %remote, username = %session.username, "client disconnected");
        } else {
            debug!(remote = %remote, "unauthenticated connection closed");
        }

        result
    }

    /// Decode and route a single inbound frame.
    ///
    /// Malformed frames are logged and dropped (connection stays open, no
    /// error frame — the sender could not correlate one anyway); unknown
    /// frame types are silently ignored.
    async fn dispatch_frame(
        &self,
        text: &str,
        session: &mut Option<Session>,
        outbound_tx: &mpsc::Sender<ServerFrame>,
        remote: SocketAddr,
    ) -> ParleyResult<()> {
        let frame = match decode_client_frame(text) {
            Ok(frame) => frame,
            Err(FrameError::UnknownType(frame_type)) => {
                debug!(remote = %remote, frame_type = %frame_type, "unknown frame type, ignoring");
                return Ok(());
            }
            Err(FrameError::Malformed(e)) => {
                warn!(remote = %remote, error = %e, "malformed frame");
                return Ok(());
            }
        };

        match frame {
            ClientFrame::Auth { username } => {
                self.handle_auth(&username, session, outbound_tx, remote).await
            }
            ClientFrame::SendMessage(message) => {
                self.handle_send(message, session, outbound_tx).await
            }
        }
    }

    /// `CONNECTED --AUTH--> AUTHENTICATED`.
    ///
    /// The connection is registered *before* the history scan: a message
    /// relayed concurrently with the handshake is then either in the
    /// history snapshot or delivered as a broadcast (possibly both — the
    /// client's id merge collapses the overlap).
    async fn handle_auth(
        &self,
        raw_username: &str,
        session: &mut Option<Session>,
        outbound_tx: &mpsc::Sender<ServerFrame>,
        remote: SocketAddr,
    ) -> ParleyResult<()> {
        if let Some(existing) = session {
            warn!(remote = %remote, username = %existing.username, "AUTH on authenticated connection");
            send_error(outbound_tx, "already authenticated").await;
            return Ok(());
        }

        let username = normalize_username(raw_username);
        if username.is_empty() {
            send_error(outbound_tx, "empty username").await;
            return Ok(());
        }

        let conn_id = self
            .registry
            .register(username.clone(), outbound_tx.clone())
            .await;

        match self.build_auth_success(&username).await {
            Ok((users, messages)) => {
                let frame = ServerFrame::AuthSuccess {
                    username: username.clone(),
                    users,
                    messages,
                };
                if outbound_tx.send(frame).await.is_err() {
                    self.registry.deregister(conn_id).await;
                    return Err(ParleyError::Transport("connection closed".into()));
                }
                info!(remote = %remote, username = %username, "auth OK");
                *session = Some(Session { conn_id, username });
                Ok(())
            }
            Err(e) => {
                // Fatal to this request only; the connection survives.
                self.registry.deregister(conn_id).await;
                error!(remote = %remote, username = %username, error = %e, "auth storage failure");
                send_error(outbound_tx, "storage failure").await;
                Ok(())
            }
        }
    }

    /// Resolve the AUTH_SUCCESS payload: ensure the user exists, then
    /// gather their history and the full peer list.
    async fn build_auth_success(
        &self,
        username: &str,
    ) -> ParleyResult<(Vec<User>, Vec<Message>)> {
        self.directory.ensure_user(username).await?;
        let messages = self.log.scan_for(username).await;
        let users = self.directory.list_users().await;
        Ok((users, messages))
    }

    /// `SEND_MESSAGE` from an authenticated connection: persist and relay.
    /// Rejected with an explicit ERROR frame before AUTH.
    async fn handle_send(
        &self,
        message: Message,
        session: &Option<Session>,
        outbound_tx: &mpsc::Sender<ServerFrame>,
    ) -> ParleyResult<()> {
        let Some(session) = session else {
            debug!("SEND_MESSAGE before AUTH rejected");
            send_error(outbound_tx, "authentication required").await;
            return Ok(());
        };

        if let Err(e) = self.relay.handle_send(message).await {
            warn!(username = %session.username, error = %e, "send failed");
            send_error(outbound_tx, &e.to_string()).await;
        }
        Ok(())
    }
}

/// Queue an ERROR frame for a connection, best effort.
async fn send_error(outbound_tx: &mpsc::Sender<ServerFrame>, message: &str) {
    let _ = outbound_tx
        .send(ServerFrame::Error {
            message: message.to_string(),
        })
        .await;
}
