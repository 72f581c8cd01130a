//! `Reflect*` evaluation: property reads, calls, construction and promise
//! settlement callbacks.

use crate::error::{RemoteError, Result};
use crate::session::SessionInner;
use crate::value::{Settlement, Value};
use codec::{Action, WireValue};
use tracing::{trace, warn};

/// A settlement callback handle names one of the requester's own functions.
/// Seen from this side it is the opposite kind of reference.
fn reply_target(handle: WireValue, field: &str) -> Result<WireValue> {
    match handle.as_action() {
        Some(Action::LocalReference { reference }) => Ok(WireValue::action(Action::RemoteReference {
            reference: reference.clone(),
        })),
        Some(Action::RemoteReference { reference }) => Ok(WireValue::action(Action::LocalReference {
            reference: reference.clone(),
        })),
        _ => Err(RemoteError::type_error(format!(
            "Expect \"{}\" to be reference to function",
            field
        ))),
    }
}

impl SessionInner {
    pub(super) fn reflect(&self, action: Action) -> Result<Value> {
        match action {
            Action::ReflectGet { target, property } => {
                let base = self.fetch(target)?;
                let key = self.fetch_key(property)?;
                base.get_property(&key)
            }
            Action::ReflectApply {
                target,
                this_arg,
                arguments,
            } => {
                let (function, this) = self.callee(target, this_arg)?;
                let arguments = self.fetch_all(arguments)?;
                function.call(&this, &arguments)
            }
            Action::ReflectConstruct { target, arguments } => {
                let constructor = self.fetch(target)?;
                let arguments = self.fetch_all(arguments)?;
                constructor.construct(&arguments)
            }
            Action::ReflectPromise {
                target,
                resolve,
                reject,
            } => {
                let resolve = reply_target(resolve, "resolve")?;
                let reject = reply_target(reject, "reject")?;
                self.settle_later(target, resolve, reject);
                Ok(Value::Undefined)
            }
            other => Err(RemoteError::protocol(format!(
                "{} is not a reflection",
                other.name()
            ))),
        }
    }

    fn fetch_all(&self, values: Vec<WireValue>) -> Result<Vec<Value>> {
        values.into_iter().map(|value| self.fetch(value)).collect()
    }

    /// Function and receiver of an apply. A `null` receiver over a property
    /// read binds the object the property was read from.
    fn callee(&self, target: WireValue, this_arg: WireValue) -> Result<(Value, Value)> {
        if this_arg == WireValue::Null {
            if let WireValue::Action(action) = target {
                return match *action {
                    Action::ReflectGet { target, property } => {
                        let base = self.fetch(target)?;
                        let key = self.fetch_key(property)?;
                        let function = base.get_property(&key)?;
                        Ok((function, base))
                    }
                    action => Ok((self.evaluate(action)?, Value::Null)),
                };
            }
            return Ok((self.fetch(target)?, Value::Null));
        }
        Ok((self.fetch(target)?, self.fetch(this_arg)?))
    }

    /// Evaluate `target` and report the outcome through the requester's
    /// callbacks, waiting first when the result is a promise
    fn settle_later(&self, target: WireValue, resolve: WireValue, reject: WireValue) {
        let outcome: Settlement = self.fetch(target).map_err(|err| err.to_value());
        let pending = match &outcome {
            Ok(Value::Object(object)) => object.as_promise().cloned(),
            _ => None,
        };

        let Some(cell) = pending else {
            self.reply_settlement(outcome, resolve, reject);
            return;
        };
        trace!(session = self.id, "awaiting promise before replying");
        let session = self.weak();
        tokio::spawn(async move {
            let settlement = cell.settled().await;
            if let Some(session) = session.upgrade() {
                session.reply_settlement(settlement, resolve, reject);
            }
        });
    }

    fn reply_settlement(&self, settlement: Settlement, resolve: WireValue, reject: WireValue) {
        let (target, value) = match settlement {
            Ok(value) => (resolve, value),
            Err(reason) => (reject, reason),
        };
        let sent = self.dispatch(&value).and_then(|argument| {
            self.send(Action::ReflectApply {
                target,
                this_arg: WireValue::Null,
                arguments: vec![argument],
            })
        });
        if let Err(err) = sent {
            if !self.is_closed() {
                warn!(session = self.id, error = %err, "promise settlement not delivered");
                self.destroy(Some(err));
            }
        }
    }
}
