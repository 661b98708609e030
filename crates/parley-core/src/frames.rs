//! Wire frames for the parley control connection.
//!
//! Every frame is a single newline-free JSON object tagged by its `type`
//! field, with the payload fields at the top level of the object:
//!
//! ```json
//! {"type":"AUTH","username":"alice"}
//! {"type":"SEND_MESSAGE","id":"1001","sender":"alice","recipient":"bob","text":"hi"}
//! ```

use serde::{Deserialize, Serialize};

use crate::message::{Message, User};

/// Frame types a client may send. Anything else is either unknown (ignored
/// by the server) or malformed (logged, connection stays open).
pub const CLIENT_FRAME_TYPES: &[&str] = &["AUTH", "SEND_MESSAGE"];

/// Frame types a server may send.
pub const SERVER_FRAME_TYPES: &[&str] = &["AUTH_SUCCESS", "NEW_MESSAGE", "ERROR"];

/// Frames sent client → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Request a session for this identity.
    #[serde(rename = "AUTH")]
    Auth { username: String },

    /// A new message to persist and relay. Fields sit inline beside `type`.
    #[serde(rename = "SEND_MESSAGE")]
    SendMessage(Message),
}

/// Frames sent server → client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Session established: resolved username, full peer list, and the
    /// user's message history.
    #[serde(rename = "AUTH_SUCCESS")]
    AuthSuccess {
        username: String,
        users: Vec<User>,
        messages: Vec<Message>,
    },

    /// Broadcast of a persisted message to every live connection.
    #[serde(rename = "NEW_MESSAGE")]
    NewMessage(Message),

    /// Explicit rejection of a frame (e.g. pre-auth SEND_MESSAGE).
    #[serde(rename = "ERROR")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_frame_shape() {
        let frame = ClientFrame::Auth {
            username: "Alice".into(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"AUTH","username":"Alice"}"#);
    }

    #[test]
    fn send_message_fields_are_inline() {
        let frame = ClientFrame::SendMessage(Message {
            id: "1001".into(),
            sender: "alice".into(),
            recipient: "bob".into(),
            text: "hi".into(),
            image: None,
        });
        let json = serde_json::to_string(&frame).unwrap();
        // Payload fields must sit beside "type", not nested.
        assert!(json.contains(r#""type":"SEND_MESSAGE""#));
        assert!(json.contains(r#""id":"1001""#));
        assert!(json.contains(r#""sender":"alice""#));
        assert!(!json.contains("SendMessage"));
    }

    #[test]
    fn new_message_round_trip() {
        let frame = ServerFrame::NewMessage(Message {
            id: "1001".into(),
            sender: "alice".into(),
            recipient: "bob".into(),
            text: "hi".into(),
            image: Some("data:image/jpeg;base64,xyz".into()),
        });
        let json = serde_json::to_string(&frame).unwrap();
        let back: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn auth_success_round_trip() {
        let frame = ServerFrame::AuthSuccess {
            username: "alice".into(),
            users: vec![
                User {
                    username: "alice".into(),
                },
                User {
                    username: "bob".into(),
                },
            ],
            messages: vec![],
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"AUTH_SUCCESS""#));
        let back: ServerFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }
}
