//! parley-core: Shared protocol library for the parley chat system.
//!
//! Provides the message/user data model, JSON wire frames, the frame codec
//! with malformed/unknown-type classification, and error types shared by
//! the server and client crates.

pub mod codec;
pub mod error;
pub mod frames;
pub mod message;

// Re-export commonly used items at crate root.
pub use codec::{decode_client_frame, decode_server_frame, encode_frame, FrameError};
pub use error::{ParleyError, ParleyResult};
pub use frames::{ClientFrame, ServerFrame};
pub use message::{generate_message_id, normalize_username, ConversationKey, Message, User};
