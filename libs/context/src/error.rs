//! # Remote Context Errors
//!
//! One taxonomy for everything a context operation can fail with. Lower
//! crates keep their own error enums; they convert here by kind.
//!
//! Errors cross the wire as error objects carrying `name` and `message`
//! ([`RemoteError::to_value`]) and come back as the same variant
//! ([`RemoteError::from_value`]). Non-error values thrown by application
//! code travel unchanged as [`RemoteError::Thrown`].

use crate::value::{ObjectRef, PropertyDescriptor, PropertyKey, Value};
use codec::ProtocolError;
use network::TransportError;
use registry::{ErrorKind, RegistryError};
use session_config::InvalidConfig;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("ReferenceError: {message}")]
    Reference { message: String },

    #[error("TypeError: {message}")]
    Type { message: String },

    #[error("RangeError: {message}")]
    Range { message: String },

    #[error("ProtocolError: {message}")]
    Protocol { message: String },

    #[error("TimeoutError: {message}")]
    Timeout { message: String },

    #[error("SessionClosedError: {message}")]
    SessionClosed { message: String },

    /// Arbitrary value thrown by application code
    #[error("{0}")]
    Thrown(Value),
}

impl RemoteError {
    pub fn reference<S: Into<String>>(message: S) -> Self {
        Self::Reference {
            message: message.into(),
        }
    }

    pub fn type_error<S: Into<String>>(message: S) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn range<S: Into<String>>(message: S) -> Self {
        Self::Range {
            message: message.into(),
        }
    }

    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::Timeout {
            message: "Request timeout".to_string(),
        }
    }

    pub fn session_closed<S: Into<String>>(message: S) -> Self {
        Self::SessionClosed {
            message: message.into(),
        }
    }

    pub fn thrown(value: impl Into<Value>) -> Self {
        Self::Thrown(value.into())
    }

    /// Error class name as seen by the peer
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reference { .. } => "ReferenceError",
            Self::Type { .. } => "TypeError",
            Self::Range { .. } => "RangeError",
            Self::Protocol { .. } => "ProtocolError",
            Self::Timeout { .. } => "TimeoutError",
            Self::SessionClosed { .. } => "SessionClosedError",
            Self::Thrown(_) => "Error",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Reference { message }
            | Self::Type { message }
            | Self::Range { message }
            | Self::Protocol { message }
            | Self::Timeout { message }
            | Self::SessionClosed { message } => message.clone(),
            Self::Thrown(value) => value.to_string(),
        }
    }

    pub fn is_type_error(&self) -> bool {
        matches!(self, Self::Type { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_session_closed(&self) -> bool {
        matches!(self, Self::SessionClosed { .. })
    }

    /// Value form sent to the peer
    pub fn to_value(&self) -> Value {
        match self {
            Self::Thrown(value) => value.clone(),
            other => Value::Object(ObjectRef::new_error(other.name(), &other.message())),
        }
    }

    /// Rebuild an error from a value received from the peer
    pub fn from_value(value: Value) -> Self {
        let Some(object) = value.as_object().filter(|o| o.is_error()) else {
            return Self::Thrown(value);
        };

        let field = |key: &str| match object.own_property(&PropertyKey::from(key)) {
            Some(PropertyDescriptor::Data {
                value: Value::String(s),
                ..
            }) => Some(s),
            _ => None,
        };
        let message = field("message").unwrap_or_default();
        match field("name").as_deref() {
            Some("ReferenceError") => Self::reference(message),
            Some("TypeError") => Self::type_error(message),
            Some("RangeError") => Self::range(message),
            Some("ProtocolError") => Self::protocol(message),
            Some("TimeoutError") => Self::Timeout { message },
            Some("SessionClosedError") => Self::session_closed(message),
            _ => Self::Thrown(value),
        }
    }
}

impl From<RegistryError> for RemoteError {
    fn from(err: RegistryError) -> Self {
        match err.kind() {
            ErrorKind::Reference => Self::reference(err.to_string()),
            ErrorKind::Type => Self::type_error(err.to_string()),
            ErrorKind::Range => Self::range(err.to_string()),
        }
    }
}

impl From<ProtocolError> for RemoteError {
    fn from(err: ProtocolError) -> Self {
        if err.is_type_error() {
            Self::type_error(err.to_string())
        } else {
            Self::protocol(err.to_string())
        }
    }
}

impl From<TransportError> for RemoteError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Protocol(e) => e.into(),
            TransportError::Closed { message } => Self::session_closed(message),
            other => Self::protocol(other.to_string()),
        }
    }
}

impl From<InvalidConfig> for RemoteError {
    fn from(err: InvalidConfig) -> Self {
        Self::type_error(err.to_string())
    }
}
