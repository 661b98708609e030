//! The device-resident mirror of the message log.
//!
//! The originating client inserts a message optimistically before the
//! server echoes it back over the broadcast channel, so `merge`'s identity
//! check is what keeps the echo from becoming a double entry.

use std::collections::HashSet;

use parley_core::{ConversationKey, Message};

/// Deduplicated, arrival-ordered local message cache.
#[derive(Debug, Default)]
pub struct SyncCache {
    messages: Vec<Message>,
    ids: HashSet<String>,
}

impl SyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a cache from a history snapshot (e.g. an AUTH_SUCCESS payload).
    /// Duplicate ids within the snapshot are collapsed.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut cache = Self::new();
        for msg in messages {
            cache.merge(msg);
        }
        cache
    }

    /// Insert a message unless one with the same id is already cached.
    ///
    /// Idempotent: repeated delivery of the same message is a no-op.
    /// Returns whether the message was newly inserted.
    pub fn merge(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());
        self.messages.push(message);
        true
    }

    /// All cached messages whose unordered `{sender, recipient}` pair equals
    /// `{user_a, user_b}`, in arrival order.
    pub fn view_for(&self, user_a: &str, user_b: &str) -> Vec<Message> {
        let key = ConversationKey::new(user_a, user_b);
        self.messages
            .iter()
            .filter(|m| m.conversation() == key)
            .cloned()
            .collect()
    }

    /// Every cached message, in arrival order.
    pub fn all(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, sender: &str, recipient: &str, text: &str) -> Message {
        Message {
            id: id.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            text: text.into(),
            image: None,
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut cache = SyncCache::new();
        let m = msg("1001", "alice", "bob", "hi");

        assert!(cache.merge(m.clone()));
        assert_eq!(cache.len(), 1);

        // Echo of the same message: no-op, cache unchanged.
        assert!(!cache.merge(m.clone()));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.all(), &[m]);
    }

    #[test]
    fn same_id_different_body_still_deduped() {
        // The id is the whole identity; a colliding id never double-enters.
        let mut cache = SyncCache::new();
        assert!(cache.merge(msg("1", "alice", "bob", "hi")));
        assert!(!cache.merge(msg("1", "alice", "bob", "edited")));
        assert_eq!(cache.all()[0].text, "hi");
    }

    #[test]
    fn view_matches_unordered_pair() {
        let mut cache = SyncCache::new();
        cache.merge(msg("1", "alice", "bob", "a->b"));
        cache.merge(msg("2", "bob", "alice", "b->a"));
        cache.merge(msg("3", "alice", "carol", "a->c"));

        let view = cache.view_for("alice", "bob");
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].text, "a->b");
        assert_eq!(view[1].text, "b->a");

        // Same view regardless of argument order.
        assert_eq!(cache.view_for("bob", "alice"), view);

        assert_eq!(cache.view_for("bob", "carol").len(), 0);
    }

    #[test]
    fn view_preserves_arrival_order() {
        let mut cache = SyncCache::new();
        for i in 0..5 {
            cache.merge(msg(&i.to_string(), "alice", "bob", &format!("m{i}")));
        }
        let texts: Vec<_> = cache
            .view_for("alice", "bob")
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn from_messages_collapses_duplicates() {
        let history = vec![
            msg("1", "alice", "bob", "hi"),
            msg("1", "alice", "bob", "hi"),
            msg("2", "bob", "alice", "yo"),
        ];
        let cache = SyncCache::from_messages(history);
        assert_eq!(cache.len(), 2);
    }
}
