//! Durable server-side state: the message log and the user directory.
//!
//! Both are append-only JSONL files with an in-memory index rebuilt at
//! startup. Appends are linearized behind a per-store mutex, so two
//! concurrent writes can never lose each other's record.

pub mod directory;
pub mod log;

pub use directory::UserDirectory;
pub use log::MessageLog;
