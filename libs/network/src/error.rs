//! Transport Error Types
//!
//! Failures of the byte transport underneath an action stream.

use codec::ProtocolError;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Peer or local side closed the stream
    #[error("Stream closed: {message}")]
    Closed { message: String },

    /// Frame or payload could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Underlying reader or writer failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// True when the failure came from malformed data rather than the
    /// connection itself
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}
