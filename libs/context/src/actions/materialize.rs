//! Building mirrors from `RemoteSet*` descriptions.

use crate::error::{RemoteError, Result};
use crate::pipeline::RemotePromise;
use crate::session::SessionInner;
use crate::value::{symbol_for, ObjectKind, ObjectRef, Value};
use codec::{Action, CacheList, DescriptorList, ObjectClass, WireValue};
use registry::Reference;
use tracing::trace;

struct Description {
    descriptors: DescriptorList,
    prototype: WireValue,
    extensible: bool,
    cached: CacheList,
}

impl SessionInner {
    /// Register a mirror for a described object and fill it in. The mirror
    /// is registered before its contents are read, so descriptions that
    /// refer back to the object resolve.
    pub(super) fn materialize(&self, action: Action) -> Result<Value> {
        let (reference, mirror, description) = match action {
            Action::RemoteSetSymbol {
                reference,
                description,
                registered,
            } => {
                let symbol = match (registered, description) {
                    (true, Some(key)) => symbol_for(&key),
                    (_, description) => ObjectRef::new_symbol(description),
                };
                self.remote.set(reference.clone(), Value::Object(symbol))?;
                return self.remote.get(&reference);
            }
            Action::RemoteSetFunction {
                reference,
                name,
                descriptors,
                prototype,
                extensible,
                cached,
            } => {
                let function = self.remote_function(reference.clone(), name.as_deref().unwrap_or(""));
                (
                    reference,
                    function,
                    Description {
                        descriptors,
                        prototype,
                        extensible,
                        cached,
                    },
                )
            }
            Action::RemoteSetObject {
                reference,
                descriptors,
                prototype,
                extensible,
                cached,
                class,
            } => {
                let kind = match class {
                    ObjectClass::Ordinary => ObjectKind::Ordinary,
                    ObjectClass::Array => ObjectKind::Array,
                    ObjectClass::Error => ObjectKind::Error,
                };
                (
                    reference,
                    ObjectRef::create(kind, None),
                    Description {
                        descriptors,
                        prototype,
                        extensible,
                        cached,
                    },
                )
            }
            other => {
                return Err(RemoteError::protocol(format!(
                    "{} does not describe an object",
                    other.name()
                )))
            }
        };

        trace!(session = self.id, %reference, "materializing mirror");
        self.remote.set(reference.clone(), Value::Object(mirror.clone()))?;
        self.populate(&mirror, description)?;
        self.remote.get(&reference)
    }

    fn populate(&self, mirror: &ObjectRef, description: Description) -> Result<()> {
        mirror.force_prototype(self.fetch_prototype(description.prototype)?);
        for (key, descriptor) in description.descriptors {
            let key = self.fetch_key(key)?;
            let descriptor = self.fetch_descriptor(descriptor)?;
            mirror.insert_property(key, descriptor);
        }
        if !description.extensible {
            mirror.prevent_extensions();
        }
        for (key, value) in description.cached {
            let value = self.fetch(value)?;
            mirror.set_cached_getter(key, value);
        }
        Ok(())
    }

    /// Stand-in for a peer's function. Calling it sends the call and
    /// returns a promise for the result.
    fn remote_function(&self, reference: Reference, name: &str) -> ObjectRef {
        let session = self.weak();
        ObjectRef::function(name, move |this, arguments| {
            let target = RemotePromise::from_weak(
                session.clone(),
                Ok(Action::Get {
                    reference: reference.clone(),
                }),
            );
            let promise = target.call_with(this, arguments).into_promise_object()?;
            Ok(Value::Object(promise))
        })
    }
}
