//! Outbound value encoding.
//!
//! Primitives travel as themselves. Objects the peer sent us go back as
//! `RemoteReference`; our own objects go as a full `RemoteSet*` description
//! the first time and as `LocalReference` plus pending diffs afterwards.

use super::SessionInner;
use crate::context::Dispatch;
use crate::error::{RemoteError, Result};
use crate::snapshot::{Change, Snapshot};
use crate::value::{ObjectKind, ObjectRef, PropertyDescriptor, PropertyKey, Value};
use codec::{Action, DescriptorArgs, ObjectClass, WireValue};
use registry::Reference;
use tracing::trace;

impl SessionInner {
    pub(crate) fn dispatch(&self, value: &Value) -> Result<WireValue> {
        match value {
            Value::Undefined => Ok(WireValue::undefined()),
            Value::Null => Ok(WireValue::Null),
            Value::Bool(b) => Ok(WireValue::Bool(*b)),
            Value::Number(n) => Ok(WireValue::Number(*n)),
            Value::String(s) => Ok(WireValue::String(s.clone())),
            Value::Object(object) => {
                if self.is_closed() {
                    return Err(RemoteError::session_closed("Session already destroyed"));
                }
                if self.remote.exists(value) {
                    let reference = self.remote.lookup(value)?;
                    return Ok(WireValue::action(Action::RemoteReference { reference }));
                }
                self.dispatch_local(object)
            }
        }
    }

    fn dispatch_local(&self, object: &ObjectRef) -> Result<WireValue> {
        match self.local.begin_dispatch(object)? {
            Dispatch::First(reference, snapshot) => {
                trace!(session = self.id, %reference, "describing object");
                match self.set_action(reference, &snapshot) {
                    Ok(action) => Ok(WireValue::action(action)),
                    Err(err) => {
                        self.local.forget(object);
                        Err(err)
                    }
                }
            }
            Dispatch::Known(reference) => {
                for change in self.local.refresh(object) {
                    let action = self.change_action(&reference, change)?;
                    self.send(action)?;
                }
                Ok(WireValue::action(Action::LocalReference { reference }))
            }
        }
    }

    pub(crate) fn dispatch_key(&self, key: &PropertyKey) -> Result<WireValue> {
        match key {
            PropertyKey::String(name) => Ok(WireValue::String(name.clone())),
            PropertyKey::Symbol(symbol) => self.dispatch(&Value::Object(symbol.clone())),
        }
    }

    fn dispatch_function(&self, function: &Option<ObjectRef>) -> Result<WireValue> {
        match function {
            Some(function) => self.dispatch(&Value::Object(function.clone())),
            None => Ok(WireValue::Null),
        }
    }

    pub(crate) fn dispatch_descriptor(&self, descriptor: &PropertyDescriptor) -> Result<DescriptorArgs> {
        Ok(match descriptor {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => DescriptorArgs::Data {
                value: self.dispatch(value)?,
                writable: *writable,
                enumerable: *enumerable,
                configurable: *configurable,
            },
            PropertyDescriptor::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => DescriptorArgs::Accessor {
                get: self.dispatch_function(get)?,
                set: self.dispatch_function(set)?,
                enumerable: *enumerable,
                configurable: *configurable,
            },
        })
    }

    fn dispatch_prototype(&self, prototype: Option<&ObjectRef>) -> Result<WireValue> {
        match prototype {
            Some(prototype) => self.dispatch(&Value::Object(prototype.clone())),
            None => Ok(WireValue::Null),
        }
    }

    /// Full description of an object the peer has not seen
    fn set_action(&self, reference: Reference, snapshot: &Snapshot) -> Result<Action> {
        let object = snapshot.target();
        if let ObjectKind::Symbol {
            description,
            registered,
        } = object.kind()
        {
            return Ok(Action::RemoteSetSymbol {
                reference,
                description: description.clone(),
                registered: *registered,
            });
        }

        let prototype = self.dispatch_prototype(snapshot.prototype())?;
        let descriptors = snapshot
            .descriptors()
            .map(|(key, descriptor)| Ok((self.dispatch_key(key)?, self.dispatch_descriptor(descriptor)?)))
            .collect::<Result<Vec<_>>>()?;
        let cached = snapshot
            .cached_getters()
            .iter()
            .map(|(key, value)| Ok((key.clone(), self.dispatch(value)?)))
            .collect::<Result<Vec<_>>>()?;
        let extensible = snapshot.is_extensible();

        Ok(match object.kind() {
            ObjectKind::Function(callable) => Action::RemoteSetFunction {
                reference,
                name: callable.name().map(str::to_string),
                descriptors,
                prototype,
                extensible,
                cached,
            },
            kind => Action::RemoteSetObject {
                reference,
                descriptors,
                prototype,
                extensible,
                cached,
                class: match kind {
                    ObjectKind::Array => ObjectClass::Array,
                    ObjectKind::Error => ObjectClass::Error,
                    _ => ObjectClass::Ordinary,
                },
            },
        })
    }

    fn change_action(&self, reference: &Reference, change: Change) -> Result<Action> {
        let reference = reference.clone();
        Ok(match change {
            Change::SetPrototype(prototype) => Action::RemoteSetPrototypeOf {
                reference,
                prototype: self.dispatch_prototype(prototype.as_ref())?,
            },
            Change::DeleteProperty(key) => Action::RemoteDeleteProperty {
                reference,
                property: self.dispatch_key(&key)?,
            },
            Change::DefineProperty(key, descriptor) => Action::RemoteDefineProperty {
                reference,
                property: self.dispatch_key(&key)?,
                descriptor: self.dispatch_descriptor(&descriptor)?,
            },
            Change::PreventExtensions => Action::RemotePreventExtensions { reference },
            Change::DeleteCache(property) => Action::RemoteDeletePropertyCache {
                reference,
                property,
            },
            Change::SetCache(property, value) => Action::RemoteSetPropertyCache {
                reference,
                property,
                value: self.dispatch(&value)?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::environment::Environment;
    use crate::session::Session;
    use crate::value::{ObjectRef, Value};
    use crate::Context;
    use codec::{Action, ObjectClass, WireValue};
    use network::{ObjectStream, StreamEvent};
    use session_config::SessionConfig;

    #[tokio::test]
    async fn test_first_dispatch_describes_then_references() {
        let context = Context::new(Environment::empty()).unwrap();
        let (ours, mut theirs) = ObjectStream::pair();
        let session = Session::open(&context, ours, SessionConfig::default()).unwrap();

        let object = ObjectRef::new_array([Value::from(1)]);
        let first = session.dispatch(&Value::from(object.clone())).unwrap();
        let reference = match first.as_action() {
            Some(Action::RemoteSetObject {
                reference, class, ..
            }) => {
                assert_eq!(*class, ObjectClass::Array);
                reference.clone()
            }
            other => panic!("unexpected {:?}", other),
        };

        object.set("0".into(), Value::from(2)).unwrap();
        let second = session.dispatch(&Value::from(object)).unwrap();
        assert_eq!(
            second,
            WireValue::action(Action::LocalReference {
                reference: reference.clone()
            })
        );
        match theirs.source.recv().await {
            Some(StreamEvent::Action(Action::RemoteDefineProperty { reference: r, .. })) => {
                assert_eq!(r, reference)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_primitives_pass_through() {
        let context = Context::new(Environment::empty()).unwrap();
        let (ours, _theirs) = ObjectStream::pair();
        let session = Session::open(&context, ours, SessionConfig::default()).unwrap();

        assert!(session.dispatch(&Value::Undefined).unwrap().is_undefined());
        assert_eq!(session.dispatch(&Value::from("x")).unwrap(), WireValue::String("x".into()));
        assert_eq!(session.dispatch(&Value::Null).unwrap(), WireValue::Null);
    }
}
