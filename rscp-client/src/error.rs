//! Client error types.

use rscp_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
///
/// Every variant except the ones produced by configuration mistakes ends the
/// connection attempt: the cipher stream cannot be resynchronized.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("cipher input of {len} bytes is not a multiple of the {block} byte block size")]
    Alignment { len: usize, block: usize },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("not connected")]
    NotConnected,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("transport timeout")]
    Timeout,

    #[error("session closed")]
    Closed,

    #[error("invalid history range: {0}")]
    InvalidRange(String),
}

impl ClientError {
    /// Returns whether a fresh connection may cure this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            _ => false,
        }
    }

    /// Returns whether this error means the frame stream was corrupt.
    pub fn is_corrupt_stream(&self) -> bool {
        matches!(
            self,
            ClientError::Protocol(_) | ClientError::Alignment { .. } | ClientError::FrameTooLarge { .. }
        )
    }
}

impl From<tokio::time::error::Elapsed> for ClientError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ClientError::Timeout
    }
}
