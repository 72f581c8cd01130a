//! # Remote Context
//!
//! ## Purpose
//!
//! Share live object graphs between two peers over an ordered action stream.
//! Each peer serves values from a [`Context`]; the other side receives
//! mirrors that stay in sync, forwards mutations back to the owner and
//! chains calls through the promise pipeline.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/registry → codec/ → network/ → [context]
//!       ↑            ↑         ↑           ↓
//!   Reference     Action    Object      Session, proxies,
//!   handles       wire      streams     snapshots, pipeline
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use remote_context::{Context, Environment, ObjectRef, Value};
//! use network::ObjectStream;
//! use session_config::SessionConfig;
//!
//! # async fn demo() -> remote_context::Result<()> {
//! let (host_stream, guest_stream) = ObjectStream::pair();
//!
//! let host = Context::new(Environment::empty())?;
//! host.set("greeting", ObjectRef::new_object().with("text", "hello"))?;
//! let _host_side = host.remote(host_stream, SessionConfig::default())?;
//!
//! let guest = Context::new(Environment::empty())?;
//! let remote = guest.remote(guest_stream, SessionConfig::default())?;
//! let text = remote.fetch("greeting").get("text").await?;
//! assert_eq!(text, Value::from("hello"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`value`]: objects, descriptors, symbols and promises
//! - [`context`]: application and per-session scopes
//! - [`library`]: serve named values to many peers, consume them from one
//! - [`session`]: request table, lifecycle and the inbound driver
//! - [`proxy`]: guarded mirrors and their change events
//! - [`snapshot`]: what the peer was last told, and the diff since
//! - [`pipeline`]: local and remote promise chains

mod actions;
pub mod context;
pub mod environment;
pub mod error;
pub mod library;
pub mod pipeline;
pub mod proxy;
pub mod session;
pub mod snapshot;
pub mod value;

pub use context::{Context, LocalContext, RemoteContext};
pub use environment::{Environment, EnvironmentBuilder};
pub use error::{RemoteError, Result};
pub use library::{Library, RemoteLibrary};
pub use pipeline::{LocalPromise, Pending, RemotePromise};
pub use proxy::{ChangeKind, MutableRemoteHandle, ProxyEvent, RemoteValue, Subscription};
pub use session::{ResponseFuture, Session, SessionEvent, SessionState};
pub use snapshot::{cache_getters, Change, Snapshot};
pub use value::{
    symbol_for, symbol_key_for, ObjectKind, ObjectRef, PropertyDescriptor, PropertyKey, Value,
};

pub use registry::Reference;
pub use session_config::SessionConfig;
