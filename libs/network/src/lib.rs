//! Network Infrastructure
//!
//! Ordered action streams for the remote context protocol. The session layer
//! only sees [`ObjectStream`]s; whether actions cross a socket as frames or an
//! in-memory channel as values is decided here.

pub mod error;
pub mod framed;
pub mod stream;

pub use error::{Result, TransportError};
pub use framed::DEFAULT_MAX_FRAME_SIZE;
pub use stream::{ActionSink, ActionSource, ObjectStream, StreamEvent};
