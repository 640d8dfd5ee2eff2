//! Common error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("metrics error: {0}")]
    Metrics(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<swarmq_protocol::ProtocolError> for SwarmError {
    fn from(err: swarmq_protocol::ProtocolError) -> Self {
        SwarmError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SwarmError>;
