//! # Contexts
//!
//! ## Purpose
//!
//! A [`Context`] is the application-facing scope of shareable values. Each
//! session opened from it gets two private scopes:
//!
//! - [`LocalContext`]: values this peer sent, with the snapshot last sent
//!   for each
//! - [`RemoteContext`]: mirrors of values the peer sent, each wrapped in a
//!   [`crate::RemoteValue`] proxy
//!
//! ## Scope chain
//!
//! ```text
//! Environment ── Context ── LocalContext (one per session)
//!      └──────────────────── RemoteContext (one per session)
//! ```
//!
//! Registering a value in a [`Context`] also registers everything reachable
//! from it in one step (prototype, property values, accessor functions,
//! symbol keys). Those child handles belong to the parent value and go away
//! when it is released.

mod local;
mod remote;

pub(crate) use local::Dispatch;
pub use local::LocalContext;
pub use remote::RemoteContext;

use crate::environment::Environment;
use crate::error::Result;
use crate::pipeline::LocalPromise;
use crate::session::Session;
use crate::value::Value;
use network::ObjectStream;
use parking_lot::Mutex;
use registry::{AssignOptions, AssignableRegistry, Reference};
use session_config::SessionConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

struct ContextInner {
    environment: Environment,
    registry: AssignableRegistry<Value>,
    /// Handles assigned on behalf of each registered value
    child_refs: Mutex<HashMap<Value, Vec<Reference>>>,
}

impl ContextInner {
    fn release_children(&self, value: &Value) {
        let children = self.child_refs.lock().remove(value);
        for reference in children.into_iter().flatten() {
            trace!(%reference, "dropping child handle");
            self.registry.delete(&reference);
        }
    }
}

#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub fn new(environment: Environment) -> Result<Self> {
        Self::with_options(environment, AssignOptions::default())
    }

    pub fn with_options(environment: Environment, options: AssignOptions) -> Result<Self> {
        let registry = AssignableRegistry::new(Some(environment.registry().clone()), options)?;
        Ok(Self::from_parts(environment, registry))
    }

    fn from_parts(environment: Environment, registry: AssignableRegistry<Value>) -> Self {
        let inner = Arc::new(ContextInner {
            environment,
            registry,
            child_refs: Mutex::new(HashMap::new()),
        });
        let weak = Arc::downgrade(&inner);
        inner.registry.on_release(move |value| {
            if let Some(inner) = weak.upgrade() {
                inner.release_children(value);
            }
        });
        Self { inner }
    }

    /// Nested context over this one, sharing the environment
    pub fn closure(&self) -> Context {
        Self::from_parts(
            self.inner.environment.clone(),
            self.inner.registry.closure(),
        )
    }

    pub fn environment(&self) -> &Environment {
        &self.inner.environment
    }

    pub fn get(&self, reference: &Reference) -> Result<Value> {
        Ok(self.inner.registry.get(reference)?)
    }

    /// Register `value` under `reference`, adopting every referable value
    /// reachable from it that the chain does not know yet
    pub fn set(&self, reference: impl Into<Reference>, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.inner.registry.set(reference.into(), value.clone())?;
        self.adopt_children(value)
    }

    /// Existing handle of `value`, or a fresh one
    pub fn assign(&self, value: impl Into<Value>) -> Result<Reference> {
        let value = value.into();
        if self.inner.registry.exists(&value) {
            return Ok(self.inner.registry.lookup(&value)?);
        }
        let reference = self.inner.registry.generate_reference()?;
        self.set(reference.clone(), value)?;
        Ok(reference)
    }

    fn adopt_children(&self, value: Value) -> Result<()> {
        let mut pending = vec![value];
        while let Some(parent) = pending.pop() {
            let Some(object) = parent.as_object() else {
                continue;
            };
            for child in object.referable_children() {
                let child = Value::Object(child);
                if self.inner.registry.exists(&child) {
                    continue;
                }
                let reference = self.inner.registry.assign(child.clone())?;
                self.inner
                    .child_refs
                    .lock()
                    .entry(parent.clone())
                    .or_default()
                    .push(reference);
                pending.push(child);
            }
        }
        Ok(())
    }

    pub fn exists(&self, value: &Value) -> bool {
        self.inner.registry.exists(value)
    }

    /// True when this context itself (not an ancestor) holds the value
    pub fn own(&self, value: &Value) -> bool {
        self.inner.registry.own(value)
    }

    pub fn lookup(&self, value: &Value) -> Result<Reference> {
        Ok(self.inner.registry.lookup(value)?)
    }

    pub fn delete(&self, reference: &Reference) -> bool {
        self.inner.registry.delete(reference)
    }

    pub fn release(&self, value: &Value) -> bool {
        self.inner.registry.release(value)
    }

    pub fn clear(&self) {
        self.inner.registry.clear();
        self.inner.child_refs.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.inner.registry.size()
    }

    pub fn own_size(&self) -> usize {
        self.inner.registry.own_size()
    }

    pub fn fetch(&self, reference: &Reference) -> LocalPromise {
        LocalPromise::from_result(self.get(reference))
    }

    pub fn resolve(&self, value: impl Into<Value>) -> LocalPromise {
        LocalPromise::resolved(value.into())
    }

    /// Open a session to a peer over `stream` and return the peer's values
    pub fn remote(&self, stream: ObjectStream, config: SessionConfig) -> Result<RemoteContext> {
        let session = Session::open(self, stream, config)?;
        Ok(session.remote().clone())
    }

    pub(crate) fn registry(&self) -> &AssignableRegistry<Value> {
        &self.inner.registry
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("environment", &self.inner.environment.name())
            .field("own_size", &self.own_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ObjectRef;

    fn context() -> Context {
        Context::new(Environment::empty()).unwrap()
    }

    #[test]
    fn test_set_adopts_reachable_values() {
        let ctx = context();
        let proto = ObjectRef::new_object();
        let inner = ObjectRef::new_object();
        let nested = ObjectRef::new_object();
        inner.set("nested".into(), Value::from(nested.clone())).unwrap();
        let root = ObjectRef::with_prototype(Some(proto.clone())).with("inner", inner.clone());

        ctx.set("root", root.clone()).unwrap();
        for value in [&proto, &inner, &nested] {
            assert!(ctx.exists(&Value::from(value.clone())));
        }
        assert_eq!(ctx.own_size(), 4);
    }

    #[test]
    fn test_release_drops_child_handles() {
        let ctx = context();
        let inner = ObjectRef::new_object();
        let nested = ObjectRef::new_object();
        inner.set("nested".into(), Value::from(nested.clone())).unwrap();
        let root = ObjectRef::new_object().with("inner", inner.clone());

        ctx.set("root", root.clone()).unwrap();
        assert!(ctx.release(&Value::from(root)));
        assert!(!ctx.exists(&Value::from(inner)));
        assert!(!ctx.exists(&Value::from(nested)));
        assert_eq!(ctx.own_size(), 0);
    }

    #[test]
    fn test_children_known_elsewhere_are_not_adopted() {
        let shared = ObjectRef::new_object();
        let env = Environment::builder("shared")
            .with("shared", shared.clone())
            .build()
            .unwrap();
        let ctx = Context::new(env).unwrap();

        ctx.set("holder", ObjectRef::new_object().with("shared", shared.clone()))
            .unwrap();
        assert_eq!(ctx.own_size(), 1);
        assert_eq!(ctx.lookup(&Value::from(shared)).unwrap(), Reference::from("shared"));
    }

    #[test]
    fn test_cyclic_graphs_terminate() {
        let ctx = context();
        let a = ObjectRef::new_object();
        let b = ObjectRef::new_object().with("a", a.clone());
        a.set("b".into(), Value::from(b.clone())).unwrap();

        ctx.set("a", a).unwrap();
        assert_eq!(ctx.own_size(), 2);
    }

    #[tokio::test]
    async fn test_fetch_and_resolve_are_local() {
        let ctx = context();
        ctx.set("foo", "bar").unwrap();
        assert_eq!(ctx.fetch(&"foo".into()).await.unwrap(), Value::from("bar"));
        assert!(ctx.fetch(&"missing".into()).await.is_err());
        assert_eq!(ctx.resolve(5).await.unwrap(), Value::from(5));
    }

    #[test]
    fn test_closure_shares_environment_and_ids() {
        let ctx = context();
        let first = ctx.assign(ObjectRef::new_object()).unwrap();
        let nested = ctx.closure();
        let second = nested.assign(ObjectRef::new_object()).unwrap();
        assert_ne!(first, second);
        assert!(nested.get(&first).is_ok());
        assert!(ctx.get(&second).is_err());
    }
}
