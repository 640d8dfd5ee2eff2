//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("bad framing: {0}")]
    BadFraming(String),

    #[error("invalid frame type: {0}")]
    InvalidFrameType(i32),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// An error reported back to the client as a length-prefixed `E_<CODE>` reply.
///
/// Fatal errors force the server to close the connection once the reply has
/// been written; non-fatal errors let the command loop continue.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{code} {detail}")]
    Fatal { code: &'static str, detail: String },

    #[error("{code} {detail}")]
    NonFatal { code: &'static str, detail: String },
}

impl ClientError {
    pub fn fatal(code: &'static str, detail: impl Into<String>) -> Self {
        ClientError::Fatal {
            code,
            detail: detail.into(),
        }
    }

    pub fn non_fatal(code: &'static str, detail: impl Into<String>) -> Self {
        ClientError::NonFatal {
            code,
            detail: detail.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Fatal { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Fatal { code, .. } | ClientError::NonFatal { code, .. } => code,
        }
    }
}
