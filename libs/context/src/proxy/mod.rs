//! # Remote-Value Proxy
//!
//! ## Purpose
//!
//! A [`RemoteValue`] guards the local stand-in of one value owned by the
//! peer. Reads are served from the stand-in; mutations go through
//! [`MutableRemoteHandle`] and are forwarded to the owner, who decides
//! whether they stick. Owner-side changes arrive as `Remote*` updates and are
//! applied through the `apply_*` methods, each emitting a change event.
//!
//! ## Errors
//!
//! Forwarded mutations answer asynchronously. A rejection is stashed on the
//! proxy, emitted as [`ProxyEvent::Error`] and handed to the next
//! `resolve()` of the value.
//!
//! ## Revocation
//!
//! Once the mirror is released the proxy is revoked: every handle operation
//! fails with a `TypeError` and observers complete.

mod observe;

pub use observe::Subscription;

use crate::error::{RemoteError, Result};
use crate::session::{Responder, SessionInner};
use crate::value::{ObjectRef, PropertyDescriptor, PropertyKey, Value};
use codec::Action;
use parking_lot::{Mutex, RwLock};
use registry::Reference;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// What changed on a mirror
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeKind {
    DefineProperty(PropertyKey),
    DeleteProperty(PropertyKey),
    SetPrototypeOf,
    PreventExtensions,
    /// Getter result refreshed or dropped
    Cache(String),
}

#[derive(Debug, Clone)]
pub enum ProxyEvent {
    Change(ChangeKind),
    Error(RemoteError),
    Revoke,
}

type Listener = Arc<dyn Fn(&ProxyEvent) + Send + Sync>;

/// Mutations a guest may attempt on a peer's value
pub trait MutableRemoteHandle {
    fn read(&self, key: &PropertyKey) -> Result<Value>;

    /// Assignment. Applied to the stand-in at once and confirmed with the
    /// owner; `false` when the stand-in refuses it.
    fn write(&self, key: PropertyKey, value: Value) -> Result<bool>;

    fn define_property(&self, key: PropertyKey, descriptor: PropertyDescriptor) -> Result<bool>;

    fn delete_property(&self, key: &PropertyKey) -> Result<bool>;

    fn set_prototype_of(&self, prototype: Option<ObjectRef>) -> Result<bool>;

    fn prevent_extensions(&self) -> Result<bool>;
}

pub(crate) struct ProxyInner {
    session: Weak<SessionInner>,
    reference: Reference,
    target: RwLock<Option<ObjectRef>>,
    error: Mutex<Option<RemoteError>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

#[derive(Clone)]
pub struct RemoteValue {
    inner: Arc<ProxyInner>,
}

impl RemoteValue {
    pub(crate) fn new(session: Weak<SessionInner>, reference: Reference, target: ObjectRef) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                session,
                reference,
                target: RwLock::new(Some(target)),
                error: Mutex::new(None),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Handle the owner registered this value under
    pub fn reference(&self) -> &Reference {
        &self.inner.reference
    }

    /// The stand-in, until revoked
    pub fn target(&self) -> Option<ObjectRef> {
        self.inner.target.read().clone()
    }

    pub fn value(&self) -> Value {
        self.target().map_or(Value::Undefined, Value::Object)
    }

    pub fn is_revoked(&self) -> bool {
        self.inner.target.read().is_none()
    }

    /// Take the stashed error of a rejected mutation, if any
    pub fn take_error(&self) -> Option<RemoteError> {
        self.inner.error.lock().take()
    }

    fn live_target(&self, operation: &str) -> Result<ObjectRef> {
        self.target().ok_or_else(|| {
            RemoteError::type_error(format!(
                "Cannot perform '{}' on a proxy that has been revoked",
                operation
            ))
        })
    }

    fn session(&self) -> Result<Arc<SessionInner>> {
        self.inner
            .session
            .upgrade()
            .ok_or_else(|| RemoteError::session_closed("Session already destroyed"))
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<ProxyInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn subscribe(&self, listener: Listener) -> u64 {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        self.inner.listeners.lock().retain(|(listener, _)| *listener != id);
    }

    fn emit(&self, event: ProxyEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Stash the first error and notify observers
    fn reject(&self, error: RemoteError) {
        debug!(reference = %self.inner.reference, error = %error, "remote mutation rejected");
        {
            let mut stash = self.inner.error.lock();
            if stash.is_none() {
                *stash = Some(error.clone());
            }
        }
        self.emit(ProxyEvent::Error(error));
    }

    pub(crate) fn revoke(&self) {
        let revoked = self.inner.target.write().take();
        if revoked.is_none() {
            return;
        }
        trace!(reference = %self.inner.reference, "proxy revoked");
        self.emit(ProxyEvent::Revoke);
        self.inner.listeners.lock().clear();
    }

    /// Send a mutation request; rejections land in the stash
    fn forward(&self, action: Action) -> Result<bool> {
        let session = self.session()?;
        let proxy = self.clone();
        let responder: Responder = Box::new(move |outcome| {
            if let Err(error) = outcome {
                proxy.reject(error);
            }
        });
        session.request_with(action, session.config().request_timeout(), responder)?;
        Ok(true)
    }

    pub(crate) fn apply_define_property(&self, key: PropertyKey, descriptor: PropertyDescriptor) {
        let Some(target) = self.target() else {
            return;
        };
        if let PropertyKey::String(name) = &key {
            target.delete_cached_getter(name);
        }
        target.insert_property(key.clone(), descriptor);
        self.emit(ProxyEvent::Change(ChangeKind::DefineProperty(key)));
    }

    pub(crate) fn apply_delete_property(&self, key: &PropertyKey) {
        let Some(target) = self.target() else {
            return;
        };
        target.remove_property(key);
        if let PropertyKey::String(name) = key {
            target.delete_cached_getter(name);
        }
        self.emit(ProxyEvent::Change(ChangeKind::DeleteProperty(key.clone())));
    }

    pub(crate) fn apply_set_prototype_of(&self, prototype: Option<ObjectRef>) {
        let Some(target) = self.target() else {
            return;
        };
        target.force_prototype(prototype);
        self.emit(ProxyEvent::Change(ChangeKind::SetPrototypeOf));
    }

    pub(crate) fn apply_prevent_extensions(&self) {
        let Some(target) = self.target() else {
            return;
        };
        target.prevent_extensions();
        self.emit(ProxyEvent::Change(ChangeKind::PreventExtensions));
    }

    pub(crate) fn apply_set_cache(&self, key: String, value: Value) {
        let Some(target) = self.target() else {
            return;
        };
        target.set_cached_getter(key.clone(), value);
        self.emit(ProxyEvent::Change(ChangeKind::Cache(key)));
    }

    pub(crate) fn apply_delete_cache(&self, key: &str) {
        let Some(target) = self.target() else {
            return;
        };
        target.delete_cached_getter(key);
        self.emit(ProxyEvent::Change(ChangeKind::Cache(key.to_string())));
    }

    /// Undo an optimistic write unless something replaced it since
    fn roll_back(
        &self,
        key: &PropertyKey,
        applied: &PropertyDescriptor,
        previous: Option<PropertyDescriptor>,
    ) {
        let Some(target) = self.target() else {
            return;
        };
        if target.own_property(key).as_ref() != Some(applied) {
            return;
        }
        match previous {
            Some(previous) => target.insert_property(key.clone(), previous),
            None => {
                target.remove_property(key);
            }
        }
        trace!(reference = %self.inner.reference, %key, "optimistic write rolled back");
    }
}

impl MutableRemoteHandle for RemoteValue {
    fn read(&self, key: &PropertyKey) -> Result<Value> {
        let target = self.live_target("get")?;
        match target.find_property(key) {
            None => Ok(Value::Undefined),
            Some(PropertyDescriptor::Data { value, .. }) => Ok(value),
            Some(PropertyDescriptor::Accessor { get: None, .. }) => Ok(Value::Undefined),
            Some(PropertyDescriptor::Accessor { .. }) => key
                .as_str()
                .and_then(|name| target.cached_getter(name))
                .ok_or_else(|| {
                    RemoteError::type_error(format!(
                        "Couldn't find property cache for getter \"{}\", please resolve this remote value again.",
                        key
                    ))
                }),
        }
    }

    fn write(&self, key: PropertyKey, value: Value) -> Result<bool> {
        let target = self.live_target("set")?;
        match target.find_property(&key) {
            Some(PropertyDescriptor::Accessor { set: Some(setter), .. }) => {
                setter.call(&Value::Object(target), &[value])?;
                return Ok(true);
            }
            Some(PropertyDescriptor::Accessor { set: None, .. }) => return Ok(false),
            Some(PropertyDescriptor::Data {
                writable: false, ..
            }) => return Ok(false),
            _ => {}
        }

        let previous = target.own_property(&key);
        let applied = match &previous {
            Some(own) => own.with_value(value),
            None if !target.is_extensible() => return Ok(false),
            None => PropertyDescriptor::data(value),
        };

        let session = self.session()?;
        let action = Action::LocalDefineProperty {
            reference: self.inner.reference.clone(),
            property: session.dispatch_key(&key)?,
            descriptor: session.dispatch_descriptor(&applied)?,
        };

        target.insert_property(key.clone(), applied.clone());
        let proxy = self.clone();
        let confirm_key = key.clone();
        let confirm_applied = applied.clone();
        let confirm_previous = previous.clone();
        let responder: Responder = Box::new(move |outcome| match outcome {
            Ok(Value::Bool(false)) => {
                proxy.roll_back(&confirm_key, &confirm_applied, confirm_previous);
            }
            Ok(_) => {}
            Err(error) => {
                proxy.roll_back(&confirm_key, &confirm_applied, confirm_previous);
                proxy.reject(error);
            }
        });

        if let Err(err) =
            session.request_with(action, session.config().request_timeout(), responder)
        {
            self.roll_back(&key, &applied, previous);
            return Err(err);
        }
        Ok(true)
    }

    fn define_property(&self, key: PropertyKey, descriptor: PropertyDescriptor) -> Result<bool> {
        self.live_target("defineProperty")?;
        let session = self.session()?;
        let action = Action::LocalDefineProperty {
            reference: self.inner.reference.clone(),
            property: session.dispatch_key(&key)?,
            descriptor: session.dispatch_descriptor(&descriptor)?,
        };
        self.forward(action)
    }

    fn delete_property(&self, key: &PropertyKey) -> Result<bool> {
        self.live_target("deleteProperty")?;
        let session = self.session()?;
        let action = Action::LocalDeleteProperty {
            reference: self.inner.reference.clone(),
            property: session.dispatch_key(key)?,
        };
        self.forward(action)
    }

    fn set_prototype_of(&self, prototype: Option<ObjectRef>) -> Result<bool> {
        self.live_target("setPrototypeOf")?;
        let session = self.session()?;
        let prototype = session.dispatch(&Value::from(prototype))?;
        let action = Action::LocalSetPrototypeOf {
            reference: self.inner.reference.clone(),
            prototype,
        };
        self.forward(action)
    }

    fn prevent_extensions(&self) -> Result<bool> {
        self.live_target("preventExtensions")?;
        self.forward(Action::LocalPreventExtensions {
            reference: self.inner.reference.clone(),
        })
    }
}

impl fmt::Debug for RemoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteValue")
            .field("reference", &self.inner.reference)
            .field("revoked", &self.is_revoked())
            .finish()
    }
}
