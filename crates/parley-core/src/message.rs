//! Core data model: users, messages, and conversation identity.
//!
//! A conversation is not stored anywhere; it is the unordered pair of
//! participant usernames that all messages between two users share.
//! Ordering within a conversation is log-append order — there is no
//! timestamp field on the wire.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A known participant. Identity is the normalized username; there is no
/// password or profile beyond existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

/// A single chat message. Immutable once created.
///
/// `id` is client-generated and serves as the deduplication key. It is not
/// guaranteed globally unique across clients; the merge logic only relies
/// on it to suppress re-delivery of the same message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub text: String,
    /// Opaque embeddable image payload (a data URI in practice).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    /// The unordered participant pair this message belongs to.
    pub fn conversation(&self) -> ConversationKey {
        ConversationKey::new(&self.sender, &self.recipient)
    }

    /// Whether `username` is the sender or the recipient.
    pub fn involves(&self, username: &str) -> bool {
        self.sender == username || self.recipient == username
    }
}

/// Normalize a raw username into its identity key: trimmed and lowercased.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// The unordered pair of usernames identifying a conversation.
///
/// Construction order does not matter: `new("alice", "bob")` equals
/// `new("bob", "alice")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    low: String,
    high: String,
}

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    /// The two participants, in lexical order.
    pub fn participants(&self) -> (&str, &str) {
        (&self.low, &self.high)
    }
}

/// Generate a fresh client-side message id.
///
/// Time-derived (decimal Unix milliseconds) with a random 32-bit suffix to
/// shrink the collision window between clients sending in the same
/// millisecond. Still only a dedup key — never treated as globally unique.
pub fn generate_message_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let salt: u32 = rand::random();
    format!("{millis}-{salt:08x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, sender: &str, recipient: &str) -> Message {
        Message {
            id: id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            text: "hi".into(),
            image: None,
        }
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_username("  Alice "), "alice");
        assert_eq!(normalize_username("BOB"), "bob");
        assert_eq!(normalize_username("carol"), "carol");
    }

    #[test]
    fn conversation_key_is_unordered() {
        let ab = ConversationKey::new("alice", "bob");
        let ba = ConversationKey::new("bob", "alice");
        assert_eq!(ab, ba);
        assert_ne!(ab, ConversationKey::new("alice", "carol"));
        assert_eq!(ab.participants(), ("alice", "bob"));
    }

    #[test]
    fn message_involves_either_side() {
        let m = msg("1", "alice", "bob");
        assert!(m.involves("alice"));
        assert!(m.involves("bob"));
        assert!(!m.involves("carol"));
        assert_eq!(m.conversation(), ConversationKey::new("bob", "alice"));
    }

    #[test]
    fn ids_differ_across_calls() {
        // Same-millisecond calls must still differ thanks to the salt.
        let a = generate_message_id();
        let b = generate_message_id();
        assert_ne!(a, b);
    }

    #[test]
    fn image_omitted_when_absent() {
        let m = msg("1", "alice", "bob");
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("image"));

        let with_image = Message {
            image: Some("data:image/jpeg;base64,abcd".into()),
            ..m
        };
        let json = serde_json::to_string(&with_image).unwrap();
        assert!(json.contains("data:image/jpeg;base64,abcd"));
    }
}
