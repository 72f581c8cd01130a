//! Values this peer has sent over one session.
//!
//! Every object that crossed the wire has a snapshot of what the peer was
//! told; the next time it is sent the snapshot yields the diff instead of a
//! full description.

use super::Context;
use crate::error::Result;
use crate::snapshot::{Change, Snapshot};
use crate::value::{ObjectRef, Value};
use parking_lot::Mutex;
use registry::{AssignOptions, AssignableRegistry, Reference};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Outcome of registering a value for sending
pub(crate) enum Dispatch {
    /// First time: the peer needs the full description
    First(Reference, Snapshot),
    /// Already mirrored by the peer
    Known(Reference),
}

struct LocalInner {
    registry: AssignableRegistry<Value>,
    parent: Context,
    snapshots: Mutex<HashMap<ObjectRef, Snapshot>>,
}

#[derive(Clone)]
pub struct LocalContext {
    inner: Arc<LocalInner>,
}

impl LocalContext {
    pub(crate) fn new(parent: &Context, options: AssignOptions) -> Result<Self> {
        let registry = AssignableRegistry::new(Some(parent.registry().registry().clone()), options)?;
        let inner = Arc::new(LocalInner {
            registry,
            parent: parent.clone(),
            snapshots: Mutex::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&inner);
        inner.registry.on_release(move |value| {
            let (Some(inner), Value::Object(object)) = (weak.upgrade(), value) else {
                return;
            };
            if inner.snapshots.lock().remove(object).is_some() {
                trace!(?object, "snapshot dropped");
            }
        });
        Ok(Self { inner })
    }

    /// The application context this session was opened from
    pub fn parent(&self) -> &Context {
        &self.inner.parent
    }

    pub fn get(&self, reference: &Reference) -> Result<Value> {
        Ok(self.inner.registry.get(reference)?)
    }

    pub fn exists(&self, value: &Value) -> bool {
        self.inner.registry.exists(value)
    }

    /// True when the value was registered by this session, not inherited
    pub fn own(&self, value: &Value) -> bool {
        self.inner.registry.own(value)
    }

    pub fn lookup(&self, value: &Value) -> Result<Reference> {
        Ok(self.inner.registry.lookup(value)?)
    }

    pub fn assign(&self, value: Value) -> Result<Reference> {
        Ok(self.inner.registry.assign(value)?)
    }

    /// Drop a handle. The value counts as never sent afterwards, so sending
    /// it again produces a full description.
    pub fn delete(&self, reference: &Reference) -> bool {
        if let Ok(Value::Object(object)) = self.inner.registry.get(reference) {
            self.forget(&object);
        }
        self.inner.registry.delete(reference)
    }

    pub fn release(&self, value: &Value) -> bool {
        if let Value::Object(object) = value {
            self.forget(object);
        }
        self.inner.registry.release(value)
    }

    pub fn clear(&self) {
        self.inner.registry.clear();
        self.inner.snapshots.lock().clear();
    }

    pub fn own_size(&self) -> usize {
        self.inner.registry.own_size()
    }

    /// Whether the peer has been sent a description of `object`
    pub fn is_dispatched(&self, object: &ObjectRef) -> bool {
        self.inner.snapshots.lock().contains_key(object)
    }

    pub(crate) fn begin_dispatch(&self, object: &ObjectRef) -> Result<Dispatch> {
        let reference = self.assign(Value::Object(object.clone()))?;
        if self.is_dispatched(object) {
            return Ok(Dispatch::Known(reference));
        }

        // getters run here, outside the snapshot lock
        let snapshot = Snapshot::capture(object);
        let mut snapshots = self.inner.snapshots.lock();
        if snapshots.contains_key(object) {
            return Ok(Dispatch::Known(reference));
        }
        snapshots.insert(object.clone(), snapshot.clone());
        Ok(Dispatch::First(reference, snapshot))
    }

    /// Changes since the peer last heard about `object`
    pub(crate) fn refresh(&self, object: &ObjectRef) -> Vec<Change> {
        let fresh = Snapshot::capture(object);
        match self.inner.snapshots.lock().get_mut(object) {
            Some(snapshot) => snapshot.advance(fresh),
            None => Vec::new(),
        }
    }

    pub(crate) fn forget(&self, object: &ObjectRef) {
        self.inner.snapshots.lock().remove(object);
    }
}

impl fmt::Debug for LocalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalContext")
            .field("own_size", &self.own_size())
            .field("dispatched", &self.inner.snapshots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    fn local() -> (Context, LocalContext) {
        let context = Context::new(Environment::empty()).unwrap();
        let local = LocalContext::new(&context, AssignOptions::default()).unwrap();
        (context, local)
    }

    #[test]
    fn test_first_dispatch_then_diffs() {
        let (_, local) = local();
        let object = ObjectRef::new_object().with("a", 1);

        let Dispatch::First(reference, snapshot) = local.begin_dispatch(&object).unwrap() else {
            panic!("expected a first dispatch");
        };
        assert_eq!(snapshot.descriptors().count(), 1);
        assert!(matches!(
            local.begin_dispatch(&object).unwrap(),
            Dispatch::Known(r) if r == reference
        ));

        object.set("a".into(), Value::from(2)).unwrap();
        assert_eq!(local.refresh(&object).len(), 1);
        assert!(local.refresh(&object).is_empty());
    }

    #[test]
    fn test_delete_resets_dispatch() {
        let (_, local) = local();
        let object = ObjectRef::new_object();
        let Dispatch::First(reference, _) = local.begin_dispatch(&object).unwrap() else {
            panic!("expected a first dispatch");
        };

        assert!(local.delete(&reference));
        assert!(!local.is_dispatched(&object));
        assert!(matches!(
            local.begin_dispatch(&object).unwrap(),
            Dispatch::First(..)
        ));
    }

    #[test]
    fn test_parent_values_keep_parent_handles() {
        let (context, local) = local();
        let shared = ObjectRef::new_object();
        context.set("shared", shared.clone()).unwrap();

        let reference = local.assign(Value::from(shared.clone())).unwrap();
        assert_eq!(reference, Reference::from("shared"));
        assert!(!local.own(&Value::from(shared)));
        assert_eq!(local.own_size(), 0);
    }
}
