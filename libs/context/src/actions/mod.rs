//! # Action Execution
//!
//! ## Purpose
//!
//! Turns inbound actions into effects on this peer. Every action doubles as
//! an expression: evaluating it yields a [`Value`], so nested reference and
//! reflection trees resolve bottom-up.
//!
//! ## Top-level policy
//!
//! - `Request`: evaluate, answer with `Response` (rejected on failure)
//! - `Response`: settle the matching open request
//! - updates for mirrors this side no longer holds are ignored with a warning
//! - any other failure destroys the session

mod materialize;
mod mutation;
mod reflect;

use crate::error::{RemoteError, Result};
use crate::session::SessionInner;
use crate::value::{ObjectRef, PropertyDescriptor, PropertyKey, Value};
use codec::{Action, DescriptorArgs, WireValue};
use tracing::{debug, warn};

impl SessionInner {
    pub(crate) fn exec(&self, action: Action) -> Result<()> {
        match action {
            Action::Request { id, action } => {
                self.answer(id, *action);
                Ok(())
            }
            Action::Response {
                request_id,
                value,
                rejected,
            } => self.handle_response(request_id, value, rejected),
            action => {
                // late updates and settlement callbacks may name handles
                // this side already dropped
                let stale_ok = matches!(
                    action,
                    Action::RemoteDefineProperty { .. }
                        | Action::RemoteDeleteProperty { .. }
                        | Action::RemoteSetPrototypeOf { .. }
                        | Action::RemotePreventExtensions { .. }
                        | Action::RemoteSetPropertyCache { .. }
                        | Action::RemoteDeletePropertyCache { .. }
                        | Action::ReflectApply { .. }
                );
                let name = action.name();
                match self.evaluate(action) {
                    Ok(_) => Ok(()),
                    Err(err @ RemoteError::Reference { .. }) if stale_ok => {
                        warn!(session = self.id, action = name, error = %err, "stale handle ignored");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    fn answer(&self, id: u32, action: Action) {
        let name = action.name();
        let (value, rejected) = match self.evaluate(action) {
            Ok(value) => (value, false),
            Err(err) => {
                debug!(session = self.id, id, action = name, error = %err, "request rejected");
                (err.to_value(), true)
            }
        };

        let encoded = self
            .dispatch(&value)
            .map(|wire| (wire, rejected))
            .or_else(|err| self.dispatch(&err.to_value()).map(|wire| (wire, true)));
        let sent = encoded.and_then(|(value, rejected)| {
            self.send(Action::Response {
                request_id: id,
                value,
                rejected,
            })
        });
        if let Err(err) = sent {
            debug!(session = self.id, id, error = %err, "response not sent");
        }
    }

    /// Value named by a received wire value
    pub(crate) fn fetch(&self, value: WireValue) -> Result<Value> {
        match value {
            WireValue::Null => Ok(Value::Null),
            WireValue::Bool(b) => Ok(Value::Bool(b)),
            WireValue::Number(n) => Ok(Value::Number(n)),
            WireValue::String(s) => Ok(Value::String(s)),
            WireValue::Action(action) => self.evaluate(*action),
        }
    }

    pub(crate) fn fetch_key(&self, value: WireValue) -> Result<PropertyKey> {
        Ok(PropertyKey::from_value(&self.fetch(value)?))
    }

    fn fetch_function(&self, value: WireValue, field: &str) -> Result<Option<ObjectRef>> {
        match self.fetch(value)? {
            Value::Null | Value::Undefined => Ok(None),
            Value::Object(function) if function.is_callable() => Ok(Some(function)),
            _ => Err(RemoteError::type_error(format!(
                "Property descriptor \"{}\" must be a function or null",
                field
            ))),
        }
    }

    pub(crate) fn fetch_descriptor(&self, descriptor: DescriptorArgs) -> Result<PropertyDescriptor> {
        Ok(match descriptor {
            DescriptorArgs::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => PropertyDescriptor::Data {
                value: self.fetch(value)?,
                writable,
                enumerable,
                configurable,
            },
            DescriptorArgs::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => PropertyDescriptor::Accessor {
                get: self.fetch_function(get, "get")?,
                set: self.fetch_function(set, "set")?,
                enumerable,
                configurable,
            },
        })
    }

    pub(crate) fn fetch_prototype(&self, value: WireValue) -> Result<Option<ObjectRef>> {
        match self.fetch(value)? {
            Value::Object(prototype) => Ok(Some(prototype)),
            Value::Null => Ok(None),
            other => Err(RemoteError::type_error(format!(
                "Object prototype may only be an Object or null: {}",
                other
            ))),
        }
    }

    pub(crate) fn evaluate(&self, action: Action) -> Result<Value> {
        match action {
            Action::UndefinedValue => Ok(Value::Undefined),
            Action::LocalReference { reference } => self.remote.get(&reference),
            Action::RemoteReference { reference } | Action::Get { reference } => {
                self.local.get(&reference)
            }
            Action::Delete { reference } => Ok(Value::Bool(self.local.delete(&reference))),

            set @ (Action::RemoteSetObject { .. }
            | Action::RemoteSetFunction { .. }
            | Action::RemoteSetSymbol { .. }) => self.materialize(set),

            mutation @ (Action::LocalDefineProperty { .. }
            | Action::LocalDeleteProperty { .. }
            | Action::LocalSetPrototypeOf { .. }
            | Action::LocalPreventExtensions { .. }) => self.mutate(mutation),

            update @ (Action::RemoteDefineProperty { .. }
            | Action::RemoteDeleteProperty { .. }
            | Action::RemoteSetPrototypeOf { .. }
            | Action::RemotePreventExtensions { .. }
            | Action::RemoteSetPropertyCache { .. }
            | Action::RemoteDeletePropertyCache { .. }) => self.update_mirror(update),

            reflect @ (Action::ReflectGet { .. }
            | Action::ReflectApply { .. }
            | Action::ReflectConstruct { .. }
            | Action::ReflectPromise { .. }) => self.reflect(reflect),

            envelope @ (Action::Request { .. } | Action::Response { .. }) => Err(
                RemoteError::protocol(format!("Unexpected {} inside a value", envelope.name())),
            ),
        }
    }
}
