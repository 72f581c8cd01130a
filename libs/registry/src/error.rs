//! Registry error types

use crate::Reference;
use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Coarse classification used by upper layers to map registry failures onto
/// their own error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Handle or value unknown in the whole chain
    Reference,
    /// Malformed handle or options
    Type,
    /// Configured capacity reached
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Reference not exists: {reference}")]
    ReferenceNotFound { reference: Reference },

    #[error("Value not exists in registry")]
    ValueNotFound,

    #[error("Invalid reference: {reason}")]
    InvalidReference { reason: String },

    #[error("Maximum references number reached: {max}")]
    LimitReached { max: u64 },

    #[error("Invalid registry options: {reason}")]
    InvalidOptions { reason: String },
}

impl RegistryError {
    pub fn not_found(reference: &Reference) -> Self {
        Self::ReferenceNotFound {
            reference: reference.clone(),
        }
    }

    pub fn invalid_reference(reference: &Reference) -> Self {
        Self::InvalidReference {
            reason: format!("{:?}", reference),
        }
    }

    pub fn invalid_options<S: Into<String>>(reason: S) -> Self {
        Self::InvalidOptions {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReferenceNotFound { .. } | Self::ValueNotFound => ErrorKind::Reference,
            Self::InvalidReference { .. } | Self::InvalidOptions { .. } => ErrorKind::Type,
            Self::LimitReached { .. } => ErrorKind::Range,
        }
    }
}
