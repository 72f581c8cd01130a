//! Mirrors of the values a peer has sent over one session.
//!
//! Each mirror is registered under the handle the peer chose and wrapped in
//! a [`RemoteValue`] proxy. Releasing a mirror revokes its proxy and tells
//! the peer the handle is free.

use crate::error::{RemoteError, Result};
use crate::pipeline::{LocalPromise, Pending, RemotePromise};
use crate::proxy::RemoteValue;
use crate::session::{Session, SessionInner};
use crate::value::{ObjectRef, Value};
use codec::Action;
use parking_lot::Mutex;
use registry::{Reference, Registry};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

struct RemoteInner {
    session: Weak<SessionInner>,
    registry: Registry<Value>,
    proxies: Mutex<HashMap<ObjectRef, RemoteValue>>,
    fetches: Mutex<HashMap<Reference, RemotePromise>>,
}

impl RemoteInner {
    /// Tell the peer a handle is no longer used, unless the session is
    /// already winding down
    fn notify_delete(&self, reference: &Reference) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if session.is_ending() {
            return;
        }
        if let Err(err) = session.send(Action::Delete {
            reference: reference.clone(),
        }) {
            debug!(%reference, error = %err, "delete notification not sent");
        }
    }

    fn revoke(&self, value: &Value) {
        let Value::Object(object) = value else {
            return;
        };
        let removed = self.proxies.lock().remove(object);
        let Some(proxy) = removed else {
            return;
        };
        let shared = self
            .registry
            .parent()
            .is_some_and(|parent| parent.exists(value));
        if !shared {
            proxy.revoke();
        }
    }
}

#[derive(Clone)]
pub struct RemoteContext {
    inner: Arc<RemoteInner>,
}

impl RemoteContext {
    pub(crate) fn new(session: Weak<SessionInner>, parent: Registry<Value>) -> Self {
        let inner = Arc::new(RemoteInner {
            session,
            registry: Registry::with_parent(parent),
            proxies: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&inner);
        inner.registry.on_release(move |value| {
            if let Some(inner) = weak.upgrade() {
                inner.revoke(value);
            }
        });
        Self { inner }
    }

    pub fn session(&self) -> Result<Session> {
        self.inner
            .session
            .upgrade()
            .map(Session::from_inner)
            .ok_or_else(|| RemoteError::session_closed("Session already destroyed"))
    }

    pub fn get(&self, reference: &Reference) -> Result<Value> {
        Ok(self.inner.registry.get(reference)?)
    }

    pub fn exists(&self, value: &Value) -> bool {
        self.inner.registry.exists(value)
    }

    pub fn own(&self, value: &Value) -> bool {
        self.inner.registry.own(value)
    }

    pub fn lookup(&self, value: &Value) -> Result<Reference> {
        Ok(self.inner.registry.lookup(value)?)
    }

    pub fn own_size(&self) -> usize {
        self.inner.registry.own_size()
    }

    /// Proxy wrapping a mirrored value
    pub fn proxy(&self, value: &Value) -> Result<RemoteValue> {
        value
            .as_object()
            .and_then(|object| self.inner.proxies.lock().get(object).cloned())
            .ok_or_else(|| {
                RemoteError::reference(format!("Value is not a remote value: {}", value))
            })
    }

    /// Proxy for the mirror registered under `reference`
    pub(crate) fn proxy_at(&self, reference: &Reference) -> Result<RemoteValue> {
        let value = self.inner.registry.get(reference)?;
        self.proxy(&value)
    }

    /// Register a mirror under the peer's handle, creating its proxy
    pub(crate) fn set(&self, reference: Reference, value: Value) -> Result<()> {
        let created = match &value {
            Value::Object(object) => {
                let mut proxies = self.inner.proxies.lock();
                if proxies.contains_key(object) {
                    false
                } else {
                    let proxy =
                        RemoteValue::new(self.inner.session.clone(), reference.clone(), object.clone());
                    proxies.insert(object.clone(), proxy);
                    true
                }
            }
            _ => false,
        };

        if let Err(err) = self.inner.registry.set(reference, value.clone()) {
            if let (true, Value::Object(object)) = (created, &value) {
                self.inner.proxies.lock().remove(object);
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Drop a mirror handle and tell the peer
    pub fn delete(&self, reference: &Reference) -> bool {
        self.inner.fetches.lock().remove(reference);
        if !self.inner.registry.delete(reference) {
            return false;
        }
        trace!(%reference, "remote handle deleted");
        self.inner.notify_delete(reference);
        true
    }

    /// Drop every handle of a mirror, revoking its proxy
    pub fn release(&self, value: &Value) -> bool {
        let references = self.inner.registry.references_of(value);
        if !self.inner.registry.release(value) {
            return false;
        }
        for reference in &references {
            self.inner.fetches.lock().remove(reference);
            self.inner.notify_delete(reference);
        }
        true
    }

    pub fn clear(&self) {
        self.inner.fetches.lock().clear();
        let entries = self.inner.registry.clear();
        for (reference, value) in &entries {
            self.inner.notify_delete(reference);
            self.inner.revoke(value);
        }
        let leftover: Vec<RemoteValue> = self.inner.proxies.lock().drain().map(|(_, p)| p).collect();
        for proxy in leftover {
            proxy.revoke();
        }
    }

    /// Pipelined handle on the peer's value under `reference`. Repeated
    /// fetches of one handle share a single request.
    pub fn fetch(&self, reference: impl Into<Reference>) -> RemotePromise {
        let reference = reference.into();
        let mut fetches = self.inner.fetches.lock();
        fetches
            .entry(reference.clone())
            .or_insert_with(|| {
                RemotePromise::from_weak(
                    self.inner.session.clone(),
                    Ok(Action::Get { reference }),
                )
            })
            .clone()
    }

    /// Fresh copy of a mirrored value; anything else resolves locally
    pub fn resolve(&self, value: impl Into<Value>) -> Pending {
        let value = value.into();
        if !value.is_referable() || !self.exists(&value) {
            return Pending::Local(LocalPromise::resolved(value));
        }
        match self.lookup(&value) {
            Ok(reference) => {
                self.inner.fetches.lock().remove(&reference);
                Pending::Remote(self.fetch(reference))
            }
            Err(err) => Pending::Local(LocalPromise::rejected(err)),
        }
    }

    /// Stop sending; the session closes once the peer ends too
    pub fn end(&self) {
        if let Some(session) = self.inner.session.upgrade() {
            session.end();
        }
    }

    pub fn destroy(&self) {
        if let Some(session) = self.inner.session.upgrade() {
            session.destroy(None);
        }
    }

    /// Error stashed by a failed write on the proxy of `value`
    pub(crate) fn take_error(&self, value: &Value) -> Option<RemoteError> {
        self.proxy(value).ok().and_then(|proxy| proxy.take_error())
    }
}

impl fmt::Debug for RemoteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteContext")
            .field("own_size", &self.own_size())
            .field("proxies", &self.inner.proxies.lock().len())
            .finish()
    }
}
