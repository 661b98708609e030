//! JSON frame codec with error classification.
//!
//! Decoding distinguishes two failure classes so callers can apply the
//! right policy: malformed payloads are logged and the connection stays
//! open; frames with a well-formed but unrecognized `type` are silently
//! ignored.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::error::ParleyResult;
use crate::frames::{ClientFrame, ServerFrame, CLIENT_FRAME_TYPES, SERVER_FRAME_TYPES};

/// Why a frame failed to decode.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Unparsable JSON, missing `type`, or a known type with bad fields.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// Valid JSON object whose `type` is not part of the protocol.
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}

/// Encode a frame as a single-line JSON string.
pub fn encode_frame<T: Serialize>(frame: &T) -> ParleyResult<String> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode a client → server frame.
pub fn decode_client_frame(text: &str) -> Result<ClientFrame, FrameError> {
    decode_frame(text, CLIENT_FRAME_TYPES)
}

/// Decode a server → client frame.
pub fn decode_server_frame(text: &str) -> Result<ServerFrame, FrameError> {
    decode_frame(text, SERVER_FRAME_TYPES)
}

fn decode_frame<T: DeserializeOwned>(
    text: &str,
    known_types: &[&str],
) -> Result<T, FrameError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;

    let frame_type = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| FrameError::Malformed("missing string `type` field".into()))?
        .to_string();

    match serde_json::from_value::<T>(value) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            if known_types.contains(&frame_type.as_str()) {
                Err(FrameError::Malformed(e.to_string()))
            } else {
                Err(FrameError::UnknownType(frame_type))
            }
        }
    }
}
