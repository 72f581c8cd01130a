//! Peer-requested changes to our own values (`Local*`) and owner-pushed
//! changes to our mirrors (`Remote*`).

use crate::error::{RemoteError, Result};
use crate::session::SessionInner;
use crate::value::{ObjectRef, Value};
use codec::Action;
use registry::Reference;

impl SessionInner {
    /// Own value the peer wants to change, if this session lets it
    fn writable_target(&self, reference: &Reference, verb: &str, named: bool) -> Result<ObjectRef> {
        let target = self.local.get(reference)?;
        if !self.is_writable(&target) {
            let message = if named {
                format!("Can't {} of a read-only object: {}", verb, target)
            } else {
                format!("Can't {} of a read-only object", verb)
            };
            return Err(RemoteError::type_error(message));
        }
        match target {
            Value::Object(object) => Ok(object),
            other => Err(RemoteError::type_error(format!(
                "Can't {} of a primitive value: {}",
                verb, other
            ))),
        }
    }

    pub(super) fn mutate(&self, action: Action) -> Result<Value> {
        let changed = match action {
            Action::LocalDefineProperty {
                reference,
                property,
                descriptor,
            } => {
                let target = self.writable_target(&reference, "define property", true)?;
                let key = self.fetch_key(property)?;
                let descriptor = self.fetch_descriptor(descriptor)?;
                target.define_own_property(key, descriptor)
            }
            Action::LocalDeleteProperty {
                reference,
                property,
            } => {
                let target = self.writable_target(&reference, "delete property", true)?;
                let key = self.fetch_key(property)?;
                target.delete_property(&key)
            }
            Action::LocalSetPrototypeOf {
                reference,
                prototype,
            } => {
                let target = self.writable_target(&reference, "set prototype", false)?;
                let prototype = self.fetch_prototype(prototype)?;
                target.set_prototype_of(prototype)
            }
            Action::LocalPreventExtensions { reference } => {
                let target = self.writable_target(&reference, "prevent extensions", false)?;
                target.prevent_extensions()
            }
            other => {
                return Err(RemoteError::protocol(format!(
                    "{} is not a mutation",
                    other.name()
                )))
            }
        };
        Ok(Value::Bool(changed))
    }

    pub(super) fn update_mirror(&self, action: Action) -> Result<Value> {
        match action {
            Action::RemoteDefineProperty {
                reference,
                property,
                descriptor,
            } => {
                let proxy = self.remote.proxy_at(&reference)?;
                let key = self.fetch_key(property)?;
                let descriptor = self.fetch_descriptor(descriptor)?;
                proxy.apply_define_property(key, descriptor);
            }
            Action::RemoteDeleteProperty {
                reference,
                property,
            } => {
                let proxy = self.remote.proxy_at(&reference)?;
                let key = self.fetch_key(property)?;
                proxy.apply_delete_property(&key);
            }
            Action::RemoteSetPrototypeOf {
                reference,
                prototype,
            } => {
                let proxy = self.remote.proxy_at(&reference)?;
                let prototype = self.fetch_prototype(prototype)?;
                proxy.apply_set_prototype_of(prototype);
            }
            Action::RemotePreventExtensions { reference } => {
                self.remote.proxy_at(&reference)?.apply_prevent_extensions();
            }
            Action::RemoteSetPropertyCache {
                reference,
                property,
                value,
            } => {
                let proxy = self.remote.proxy_at(&reference)?;
                let value = self.fetch(value)?;
                proxy.apply_set_cache(property, value);
            }
            Action::RemoteDeletePropertyCache {
                reference,
                property,
            } => {
                self.remote.proxy_at(&reference)?.apply_delete_cache(&property);
            }
            other => {
                return Err(RemoteError::protocol(format!(
                    "{} is not a mirror update",
                    other.name()
                )))
            }
        }
        Ok(Value::Bool(true))
    }
}
