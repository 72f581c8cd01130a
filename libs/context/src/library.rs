//! # Libraries
//!
//! ## Purpose
//!
//! The common deployment shape: one side publishes a set of named values,
//! the other side consumes them.
//!
//! - [`Library`]: a [`Context`] served to any number of peers. Each
//!   [`Library::serve`] opens a separate session, so every peer gets its
//!   own handles, mirrors and snapshots over the same values.
//! - [`RemoteLibrary`]: the consuming end of one such session, with the
//!   handle operations of a [`RemoteContext`] under library names.

use crate::context::{Context, RemoteContext};
use crate::environment::Environment;
use crate::error::Result;
use crate::pipeline::{Pending, RemotePromise};
use crate::session::{Session, SessionEvent};
use crate::value::Value;
use network::ObjectStream;
use registry::Reference;
use session_config::SessionConfig;
use std::fmt;
use tokio::sync::broadcast;
use tracing::info;

/// Named values served to every peer that connects
#[derive(Clone)]
pub struct Library {
    context: Context,
    config: SessionConfig,
}

impl Library {
    /// Library over the empty environment
    pub fn new(config: SessionConfig) -> Result<Self> {
        Self::with_environment(Environment::empty(), config)
    }

    pub fn with_environment(environment: Environment, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let context = Context::with_options(environment, config.assign_options())?;
        Ok(Self { context, config })
    }

    /// Publish `value` under `name`
    pub fn set(&self, name: impl Into<Reference>, value: impl Into<Value>) -> Result<()> {
        self.context.set(name, value)
    }

    /// Builder form of [`Library::set`]
    pub fn with(self, name: impl Into<Reference>, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Serve this library to one more peer over `stream`
    pub fn serve(&self, stream: ObjectStream) -> Result<Session> {
        let remote = self.context.remote(stream, self.config.clone())?;
        let session = remote.session()?;
        info!(
            session = session.id(),
            values = self.context.own_size(),
            "library served"
        );
        Ok(session)
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("context", &self.context)
            .finish()
    }
}

/// Consuming end of a served [`Library`]
#[derive(Clone)]
pub struct RemoteLibrary {
    local: Library,
    remote: RemoteContext,
}

impl RemoteLibrary {
    pub fn connect(stream: ObjectStream, config: SessionConfig) -> Result<Self> {
        Self::connect_with_environment(Environment::empty(), stream, config)
    }

    /// Both ends must agree on `environment` for its values to travel by name
    pub fn connect_with_environment(
        environment: Environment,
        stream: ObjectStream,
        config: SessionConfig,
    ) -> Result<Self> {
        let local = Library::with_environment(environment, config)?;
        let remote = local.context.remote(stream, local.config.clone())?;
        Ok(Self { local, remote })
    }

    pub fn context(&self) -> &RemoteContext {
        &self.remote
    }

    /// Values this side exposes back to the library, such as callbacks
    pub fn local(&self) -> &Library {
        &self.local
    }

    pub fn session(&self) -> Result<Session> {
        self.remote.session()
    }

    /// Session events: end, finish, error and close
    pub fn subscribe(&self) -> Result<broadcast::Receiver<SessionEvent>> {
        Ok(self.remote.session()?.subscribe())
    }

    pub fn get(&self, reference: impl Into<Reference>) -> RemotePromise {
        self.remote.fetch(reference)
    }

    /// Call the library function published under `reference`
    pub fn call(&self, reference: impl Into<Reference>, arguments: &[Value]) -> RemotePromise {
        self.remote.fetch(reference).call(arguments)
    }

    pub fn delete(&self, reference: &Reference) -> bool {
        self.remote.delete(reference)
    }

    pub fn release(&self, value: &Value) -> bool {
        self.remote.release(value)
    }

    pub fn resolve(&self, value: impl Into<Value>) -> Pending {
        self.remote.resolve(value)
    }

    pub fn end(&self) {
        self.remote.end();
    }

    pub fn destroy(&self) {
        self.remote.destroy();
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        if let Ok(session) = self.remote.session() {
            session.closed().await;
        }
    }
}

impl fmt::Debug for RemoteLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteLibrary")
            .field("remote", &self.remote)
            .finish()
    }
}
