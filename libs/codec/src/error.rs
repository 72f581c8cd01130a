//! Protocol-level errors for action encoding and decoding
//!
//! Every variant carries enough context to identify the offending action and
//! argument position when a peer sends malformed data.

use thiserror::Error;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    /// Tag byte not registered in the action table
    #[error("Unknown action tag {tag:#04x}")]
    UnknownActionTag { tag: u8 },

    /// Required positional argument absent
    #[error("Missing argument {index} of {action}")]
    MissingArgument { action: &'static str, index: usize },

    /// Argument present but of the wrong shape
    #[error("Invalid argument {index} of {action}: expected {expected}, got {got}")]
    InvalidArgument {
        action: &'static str,
        index: usize,
        expected: &'static str,
        got: String,
    },

    /// More arguments than the action declares
    #[error("Too many arguments for {action}: expected at most {max}, got {got}")]
    TooManyArguments {
        action: &'static str,
        max: usize,
        got: usize,
    },

    /// Action appeared where it is not allowed
    #[error("Unexpected {action} in {context}")]
    UnexpectedAction {
        action: &'static str,
        context: &'static str,
    },

    /// Accessor and data fields mixed in one descriptor
    #[error("Invalid property descriptor: {reason}")]
    InvalidDescriptor { reason: String },

    /// Frame length exceeds the negotiated maximum
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Lists and actions nested deeper than the decoder accepts
    #[error("Nesting too deep: {depth} levels exceeds maximum {max}")]
    NestingTooDeep { depth: usize, max: usize },

    /// Payload could not be (de)serialized
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl ProtocolError {
    pub fn invalid_argument(
        action: &'static str,
        index: usize,
        expected: &'static str,
        got: impl std::fmt::Debug,
    ) -> Self {
        Self::InvalidArgument {
            action,
            index,
            expected,
            got: format!("{:?}", got),
        }
    }

    pub fn invalid_descriptor<S: Into<String>>(reason: S) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    /// Malformed descriptors are a `TypeError` on the receiving side rather
    /// than a broken stream
    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::InvalidDescriptor { .. })
    }
}

impl From<bincode::Error> for ProtocolError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
