use thiserror::Error;

/// Errors produced by the parley protocol layer.
#[derive(Debug, Error)]
pub enum ParleyError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ParleyError {
    fn from(e: serde_json::Error) -> Self {
        ParleyError::Codec(e.to_string())
    }
}

pub type ParleyResult<T> = Result<T, ParleyError>;
