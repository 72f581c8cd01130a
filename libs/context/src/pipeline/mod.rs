//! # Promise Pipeline
//!
//! ## Purpose
//!
//! Chains of property reads, calls and constructions over values that may
//! live on either peer. A [`RemotePromise`] records the chain as one action
//! tree and costs a single round trip when awaited; a [`LocalPromise`]
//! evaluates each step at once. [`Pending`] is whichever one applies.
//!
//! ```text
//! remote.fetch("api").get("users").call(&[id])   // no traffic yet
//!     .await                                      // one ReflectPromise
//! ```

mod local;
mod remote;

pub use local::LocalPromise;
pub use remote::RemotePromise;

use crate::error::Result;
use crate::value::Value;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::IntoFuture;

/// A pipeline step on either peer
#[derive(Debug, Clone)]
pub enum Pending {
    Local(LocalPromise),
    Remote(RemotePromise),
}

impl Pending {
    pub fn is_remote(&self) -> bool {
        matches!(self, Pending::Remote(_))
    }

    pub fn get(&self, key: impl Into<Value>) -> Pending {
        match self {
            Pending::Local(promise) => Pending::Local(promise.get(key)),
            Pending::Remote(promise) => Pending::Remote(promise.get(key)),
        }
    }

    pub fn call(&self, arguments: &[Value]) -> Pending {
        match self {
            Pending::Local(promise) => Pending::Local(promise.call(arguments)),
            Pending::Remote(promise) => Pending::Remote(promise.call(arguments)),
        }
    }

    pub fn call_with(&self, this: &Value, arguments: &[Value]) -> Pending {
        match self {
            Pending::Local(promise) => Pending::Local(promise.call_with(this, arguments)),
            Pending::Remote(promise) => Pending::Remote(promise.call_with(this, arguments)),
        }
    }

    pub fn construct(&self, arguments: &[Value]) -> Pending {
        match self {
            Pending::Local(promise) => Pending::Local(promise.construct(arguments)),
            Pending::Remote(promise) => Pending::Remote(promise.construct(arguments)),
        }
    }

    pub async fn resolve(&self) -> Result<Value> {
        match self {
            Pending::Local(promise) => promise.resolve().await,
            Pending::Remote(promise) => promise.resolve().await,
        }
    }
}

impl From<LocalPromise> for Pending {
    fn from(promise: LocalPromise) -> Self {
        Pending::Local(promise)
    }
}

impl From<RemotePromise> for Pending {
    fn from(promise: RemotePromise) -> Self {
        Pending::Remote(promise)
    }
}

impl IntoFuture for Pending {
    type Output = Result<Value>;
    type IntoFuture = BoxFuture<'static, Result<Value>>;

    fn into_future(self) -> Self::IntoFuture {
        async move { self.resolve().await }.boxed()
    }
}
