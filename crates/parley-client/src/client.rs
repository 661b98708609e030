//! The client connection controller.
//!
//! `ChatClient` owns one websocket connection for the life of an
//! authenticated session: it performs the AUTH handshake on connect, routes
//! inbound frames into the local sync cache, and transmits locally-composed
//! messages fire-and-forget. There is no retry and no reconnection —
//! connection loss is terminal for the session, and a fresh `connect`
//! (fresh AUTH) is the only recovery.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

use parley_core::{
    decode_server_frame, encode_frame, generate_message_id, ClientFrame, ConversationKey,
    FrameError, Message, ParleyError, ParleyResult, ServerFrame, User,
};

use crate::cache::SyncCache;
use crate::store::{LocalStore, KEY_AUTH_RESPONSE, KEY_MESSAGES, KEY_USERNAME};

/// Events surfaced to the presenting UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message was newly merged into the cache (inbound broadcast).
    Message(Message),
    /// A message arrived for a conversation that is not currently open.
    Unread { from: String },
    /// The connection closed. The session is over; reconnecting requires a
    /// fresh AUTH via [`ChatClient::connect`].
    Disconnected,
}

/// A live, authenticated chat session.
pub struct ChatClient {
    /// Resolved (normalized) username from AUTH_SUCCESS.
    username: String,
    /// Peer list from AUTH_SUCCESS.
    peers: Vec<User>,
    /// The device-resident log mirror.
    cache: Arc<Mutex<SyncCache>>,
    /// Opaque device persistence.
    store: Arc<dyn LocalStore>,
    /// Peer username of the conversation currently on screen, if any.
    active_conversation: Arc<Mutex<Option<String>>>,
    /// Sender for outgoing frames (writer task owns the sink).
    outgoing_tx: mpsc::Sender<String>,
    /// Whether the connection is still up.
    connected: Arc<Mutex<bool>>,
    reader_handle: tokio::task::JoinHandle<()>,
    writer_handle: tokio::task::JoinHandle<()>,
}

impl ChatClient {
    /// Connect to a parley server, authenticate as `username`, and populate
    /// the local store and cache from the AUTH_SUCCESS payload.
    ///
    /// Returns the client plus the event stream for the presenting UI.
    pub async fn connect(
        url: &str,
        username: &str,
        store: Arc<dyn LocalStore>,
    ) -> ParleyResult<(Self, mpsc::Receiver<ChatEvent>)> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ParleyError::Transport(format!("websocket connect failed: {e}")))?;
        let (mut ws_sink, mut ws_read) = ws_stream.split();

        // AUTH as soon as the connection is open.
        let auth = encode_frame(&ClientFrame::Auth {
            username: username.to_string(),
        })?;
        ws_sink
            .send(WsMessage::Text(auth))
            .await
            .map_err(|e| ParleyError::Transport(format!("websocket send failed: {e}")))?;

        // Wait for AUTH_SUCCESS (an ERROR here fails the login). A
        // broadcast can land before the handshake reply when another user
        // sends concurrently; those messages are buffered and merged after
        // the history, where the id merge collapses any overlap.
        let mut early: Vec<Message> = Vec::new();
        let (resolved, peers, history, raw_auth) = loop {
            let msg = ws_read
                .next()
                .await
                .ok_or_else(|| ParleyError::Transport("connection closed during AUTH".into()))?
                .map_err(|e| ParleyError::Transport(format!("websocket recv failed: {e}")))?;

            let text = match msg {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => {
                    return Err(ParleyError::Transport("connection closed during AUTH".into()))
                }
                _ => continue,
            };

            match decode_server_frame(&text) {
                Ok(ServerFrame::AuthSuccess {
                    username,
                    users,
                    messages,
                }) => break (username, users, messages, text),
                Ok(ServerFrame::Error { message }) => {
                    return Err(ParleyError::AuthFailed(message))
                }
                Ok(ServerFrame::NewMessage(message)) => early.push(message),
                Err(e) => warn!(error = %e, "undecodable frame during AUTH"),
            }
        };

        let mut initial = SyncCache::from_messages(history);
        for message in early {
            initial.merge(message);
        }

        // Persist the session payload into the opaque device store.
        store.set(KEY_USERNAME, resolved.clone());
        store.set(KEY_MESSAGES, serde_json::to_string(initial.all())?);
        store.set(KEY_AUTH_RESPONSE, raw_auth);

        let cache = Arc::new(Mutex::new(initial));
        let active_conversation = Arc::new(Mutex::new(None));
        let connected = Arc::new(Mutex::new(true));

        let (event_tx, event_rx) = mpsc::channel::<ChatEvent>(256);
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<String>(256);

        // Writer task: drains the outgoing queue into the sink.
        let writer_handle = tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if let Err(e) = ws_sink.send(WsMessage::Text(text)).await {
                    debug!(error = %e, "websocket write failed, stopping writer");
                    break;
                }
            }
        });

        // Reader task: routes inbound frames into the cache.
        let reader_handle = {
            let cache = cache.clone();
            let store = store.clone();
            let active = active_conversation.clone();
            let connected = connected.clone();
            let me = resolved.clone();
            tokio::spawn(async move {
                while let Some(msg) = ws_read.next().await {
                    let text = match msg {
                        Ok(WsMessage::Text(text)) => text,
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => continue,
                        Err(e) => {
                            debug!(error = %e, "websocket read failed");
                            break;
                        }
                    };

                    match decode_server_frame(&text) {
                        Ok(ServerFrame::NewMessage(message)) => {
                            let inserted = {
                                let mut cache = lock(&cache);
                                cache.merge(message.clone())
                            };
                            if !inserted {
                                // Echo of our own optimistic insert.
                                continue;
                            }
                            persist_messages(&store, &cache);

                            let active_peer = lock(&active).clone();
                            if should_flag_unread(&message, &me, active_peer.as_deref()) {
                                let _ = event_tx
                                    .send(ChatEvent::Unread {
                                        from: message.sender.clone(),
                                    })
                                    .await;
                            }
                            let _ = event_tx.send(ChatEvent::Message(message)).await;
                        }
                        Ok(ServerFrame::Error { message }) => {
                            warn!(message = %message, "server error frame");
                        }
                        Ok(other) => debug!(?other, "unexpected server frame"),
                        Err(FrameError::UnknownType(t)) => {
                            debug!(frame_type = %t, "unknown server frame type, ignoring");
                        }
                        Err(FrameError::Malformed(e)) => {
                            warn!(error = %e, "malformed server frame");
                        }
                    }
                }

                *lock(&connected) = false;
                let _ = event_tx.send(ChatEvent::Disconnected).await;
                debug!("reader task ended");
            })
        };

        let client = Self {
            username: resolved,
            peers,
            cache,
            store,
            active_conversation,
            outgoing_tx,
            connected,
            reader_handle,
            writer_handle,
        };

        Ok((client, event_rx))
    }

    /// Compose and transmit a message. The message is inserted into the
    /// local cache unconditionally *before* transmission (optimistic
    /// insert); the server echo is later suppressed by the id merge.
    /// Fire-and-forget: the server never acknowledges SEND_MESSAGE.
    pub async fn send(
        &self,
        recipient: &str,
        text: &str,
        image: Option<String>,
    ) -> ParleyResult<Message> {
        if recipient.is_empty() {
            return Err(ParleyError::InvalidFrame("empty recipient".into()));
        }

        let message = Message {
            id: generate_message_id(),
            sender: self.username.clone(),
            recipient: recipient.to_string(),
            text: text.to_string(),
            image,
        };

        {
            let mut cache = lock(&self.cache);
            cache.merge(message.clone());
        }
        persist_messages(&self.store, &self.cache);

        let frame = encode_frame(&ClientFrame::SendMessage(message.clone()))?;
        self.outgoing_tx
            .send(frame)
            .await
            .map_err(|_| ParleyError::Transport("connection closed".into()))?;

        Ok(message)
    }

    /// Mark a conversation as on-screen: its messages no longer raise
    /// unread events.
    pub fn open_conversation(&self, peer: &str) {
        *lock(&self.active_conversation) = Some(peer.to_string());
    }

    /// No conversation is on screen any more.
    pub fn close_conversation(&self) {
        *lock(&self.active_conversation) = None;
    }

    /// Arrival-ordered view of the conversation with `peer`.
    pub fn view(&self, peer: &str) -> Vec<Message> {
        lock(&self.cache).view_for(&self.username, peer)
    }

    /// The resolved (normalized) username of this session.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Peer list from the AUTH_SUCCESS payload, in directory order.
    pub fn peers(&self) -> &[User] {
        &self.peers
    }

    /// Whether the connection is still up.
    pub fn is_connected(&self) -> bool {
        *lock(&self.connected)
    }

    /// Tear the session down. The server observes a plain disconnect and
    /// deregisters the connection.
    pub async fn close(self) {
        *lock(&self.connected) = false;
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

/// Whether an inbound message should raise an unread indicator: it came
/// from someone else and its conversation is not the one on screen.
fn should_flag_unread(message: &Message, me: &str, active_peer: Option<&str>) -> bool {
    if message.sender == me {
        return false;
    }
    match active_peer {
        Some(peer) => message.conversation() != ConversationKey::new(me, peer),
        None => true,
    }
}

/// Rewrite the full message mirror into the device store.
fn persist_messages(store: &Arc<dyn LocalStore>, cache: &Arc<Mutex<SyncCache>>) {
    let snapshot = {
        let cache = lock(cache);
        serde_json::to_string(cache.all())
    };
    match snapshot {
        Ok(json) => store.set(KEY_MESSAGES, json),
        Err(e) => warn!(error = %e, "failed to serialize message mirror"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
