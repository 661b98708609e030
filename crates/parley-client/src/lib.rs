//! parley-client: Rust client library for the parley chat protocol.
//!
//! Provides a native async client that connects to a parley server over
//! WebSocket, authenticates into a username-keyed session, and mirrors the
//! server's message log into a deduplicated local cache.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley_client::{ChatClient, ChatEvent, MemoryStore};
//!
//! # async fn example() -> parley_core::ParleyResult<()> {
//! let store = Arc::new(MemoryStore::new());
//! let (client, mut events) = ChatClient::connect("ws://localhost:8080", "alice", store).await?;
//!
//! client.send("bob", "hi", None).await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ChatEvent::Message(msg) = event {
//!         println!("{}: {}", msg.sender, msg.text);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod store;

// Re-export primary public types.
pub use cache::SyncCache;
pub use client::{ChatClient, ChatEvent};
pub use store::{LocalStore, MemoryStore, KEY_AUTH_RESPONSE, KEY_MESSAGES, KEY_USERNAME};

// Re-export parley-core error types for convenience.
pub use parley_core::{ParleyError, ParleyResult};
