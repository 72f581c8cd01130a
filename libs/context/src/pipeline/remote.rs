use crate::error::{RemoteError, Result};
use crate::session::{Session, SessionInner, SessionState};
use crate::value::{ObjectRef, Value};
use codec::{Action, WireValue};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use registry::Reference;
use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace};

type SharedOutcome = Shared<BoxFuture<'static, Result<Value>>>;

/// Pipeline step over a value on the peer. Building steps sends nothing;
/// the whole chain travels as one action tree when resolved.
#[derive(Clone)]
pub struct RemotePromise {
    session: Weak<SessionInner>,
    tree: std::result::Result<Arc<Action>, RemoteError>,
    /// `None` uses the session's default request timeout
    timeout: Option<Option<Duration>>,
    outcome: Arc<Mutex<Option<SharedOutcome>>>,
}

impl RemotePromise {
    pub fn new(session: &Session, action: Action) -> Self {
        Self::from_weak(session.downgrade(), Ok(action))
    }

    pub(crate) fn from_weak(session: Weak<SessionInner>, tree: Result<Action>) -> Self {
        Self {
            session,
            tree: tree.map(Arc::new),
            timeout: None,
            outcome: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the request timeout; `None` waits indefinitely
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Some(timeout);
        self.outcome = Arc::new(Mutex::new(None));
        self
    }

    /// The action tree this promise evaluates
    pub fn action(&self) -> Result<&Action> {
        self.tree.as_deref().map_err(Clone::clone)
    }

    fn extend<F>(&self, build: F) -> RemotePromise
    where
        F: FnOnce(&SessionInner, WireValue) -> Result<Action>,
    {
        let tree = match (&self.tree, self.session.upgrade()) {
            (Err(err), _) => Err(err.clone()),
            (Ok(_), None) => Err(RemoteError::session_closed("Session already destroyed")),
            (Ok(action), Some(session)) => build(&session, WireValue::action((**action).clone())),
        };
        RemotePromise {
            session: self.session.clone(),
            tree: tree.map(Arc::new),
            timeout: self.timeout,
            outcome: Arc::new(Mutex::new(None)),
        }
    }

    pub fn get(&self, key: impl Into<Value>) -> RemotePromise {
        let key = key.into();
        self.extend(|session, target| {
            Ok(Action::ReflectGet {
                target,
                property: session.dispatch(&key)?,
            })
        })
    }

    /// Call the value; after `get`, the object read from is `this`
    pub fn call(&self, arguments: &[Value]) -> RemotePromise {
        self.extend(|session, target| {
            Ok(Action::ReflectApply {
                target,
                this_arg: WireValue::Null,
                arguments: dispatch_all(session, arguments)?,
            })
        })
    }

    pub fn call_with(&self, this: &Value, arguments: &[Value]) -> RemotePromise {
        self.extend(|session, target| {
            Ok(Action::ReflectApply {
                target,
                this_arg: session.dispatch(this)?,
                arguments: dispatch_all(session, arguments)?,
            })
        })
    }

    pub fn construct(&self, arguments: &[Value]) -> RemotePromise {
        self.extend(|session, target| {
            Ok(Action::ReflectConstruct {
                target,
                arguments: dispatch_all(session, arguments)?,
            })
        })
    }

    /// Evaluate the tree on the peer. Clones share one request.
    pub fn resolve(&self) -> SharedOutcome {
        let mut slot = self.outcome.lock();
        if let Some(outcome) = slot.as_ref() {
            return outcome.clone();
        }
        let outcome = settle(self.session.clone(), self.tree.clone(), self.timeout)
            .boxed()
            .shared();
        *slot = Some(outcome.clone());
        outcome
    }

    /// A local promise object settled with this promise's outcome
    pub fn into_promise_object(self) -> Result<ObjectRef> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RemoteError::type_error("Remote calls need a running tokio runtime")
        })?;
        let (promise, resolver) = ObjectRef::new_promise();
        let outcome = self.resolve();
        runtime.spawn(async move {
            match outcome.await {
                Ok(value) => resolver.resolve(value),
                Err(err) => resolver.reject(err.to_value()),
            };
        });
        Ok(promise)
    }
}

fn dispatch_all(session: &SessionInner, values: &[Value]) -> Result<Vec<WireValue>> {
    values.iter().map(|value| session.dispatch(value)).collect()
}

/// Closes over the requester's settlement callbacks
struct Callbacks {
    resolve: Reference,
    reject: Reference,
}

impl Callbacks {
    fn register(session: &SessionInner) -> Result<(Self, oneshot::Receiver<Result<Value>>)> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let fulfil = slot.clone();
        let resolve = ObjectRef::function("resolve", move |_, arguments| {
            if let Some(tx) = fulfil.lock().take() {
                let _ = tx.send(Ok(arguments.first().cloned().unwrap_or_default()));
            }
            Ok(Value::Undefined)
        });
        let fail = slot;
        let reject = ObjectRef::function("reject", move |_, arguments| {
            if let Some(tx) = fail.lock().take() {
                let reason = arguments.first().cloned().unwrap_or_default();
                let _ = tx.send(Err(RemoteError::from_value(reason)));
            }
            Ok(Value::Undefined)
        });

        let resolve = session.local.assign(Value::Object(resolve))?;
        let reject = match session.local.assign(Value::Object(reject)) {
            Ok(reference) => reference,
            Err(err) => {
                session.local.delete(&resolve);
                return Err(err);
            }
        };
        Ok((Self { resolve, reject }, rx))
    }

    fn drop_from(self, session: &Weak<SessionInner>) {
        if let Some(session) = session.upgrade() {
            session.local.delete(&self.resolve);
            session.local.delete(&self.reject);
        }
    }
}

async fn settle(
    session: Weak<SessionInner>,
    tree: std::result::Result<Arc<Action>, RemoteError>,
    timeout: Option<Option<Duration>>,
) -> Result<Value> {
    let action = (*tree?).clone();

    let (callbacks, settled, acknowledged, mut state) = {
        let inner = session
            .upgrade()
            .ok_or_else(|| RemoteError::session_closed("Session already destroyed"))?;
        let (callbacks, settled) = Callbacks::register(&inner)?;
        let request = Action::ReflectPromise {
            target: WireValue::action(action),
            resolve: WireValue::action(Action::LocalReference {
                reference: callbacks.resolve.clone(),
            }),
            reject: WireValue::action(Action::LocalReference {
                reference: callbacks.reject.clone(),
            }),
        };
        let timeout = timeout.unwrap_or_else(|| inner.config().request_timeout());
        match inner.request(request, timeout) {
            Ok(acknowledged) => (callbacks, settled, acknowledged, inner.state_receiver()),
            Err(err) => {
                callbacks.drop_from(&session);
                return Err(err);
            }
        }
    };

    if let Err(err) = acknowledged.await {
        debug!(error = %err, "promise request failed");
        callbacks.drop_from(&session);
        return Err(err);
    }

    let closed = RemoteError::session_closed("Session closed before promise resolved");
    let outcome = tokio::select! {
        biased;
        settled = settled => settled.unwrap_or_else(|_| Err(closed.clone())),
        _ = state.wait_for(|state| *state == SessionState::Closed) => Err(closed),
    };
    callbacks.drop_from(&session);
    trace!(ok = outcome.is_ok(), "remote promise settled");

    let value = outcome?;
    let stashed = session
        .upgrade()
        .and_then(|inner| inner.remote.take_error(&value));
    match stashed {
        Some(err) => Err(err),
        None => Ok(value),
    }
}

impl IntoFuture for RemotePromise {
    type Output = Result<Value>;
    type IntoFuture = SharedOutcome;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve()
    }
}

impl fmt::Debug for RemotePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePromise")
            .field("action", &self.tree.as_ref().map(|action| action.name()))
            .field("timeout", &self.timeout)
            .finish()
    }
}
