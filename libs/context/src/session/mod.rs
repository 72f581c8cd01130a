//! # Session
//!
//! ## Purpose
//!
//! One live connection between two peers. A session owns the outbound half
//! of an [`ObjectStream`], a driver task reading the inbound half, the table
//! of open requests and the two per-session scopes ([`LocalContext`] and
//! [`RemoteContext`]).
//!
//! ## Lifecycle
//!
//! ```text
//!            end() / peer End
//!   Open ───────────────────────▶ Ending ──────────▶ Closed
//!     │                             │   both ended,      ▲
//!     │                             │   end timeout or   │
//!     └──────── destroy(err) ───────┴── destroy(err) ────┘
//! ```
//!
//! - `end()` stops sending and fails new requests; answers still arrive.
//! - A peer End fails every open request and schedules `destroy` after the
//!   end timeout unless this side already ended.
//! - `destroy(err)` fails open requests in issue order, emits `Error` only
//!   if no request took the error, then `Close`, and clears both scopes.
//!
//! ## Ordering
//!
//! Inbound actions run one at a time in arrival order on the driver task.

mod dispatch;
mod driver;
mod requests;

pub use requests::ResponseFuture;
pub(crate) use requests::Responder;

use crate::context::{Context, LocalContext, RemoteContext};
use crate::error::{RemoteError, Result};
use crate::value::Value;
use codec::{Action, WireValue};
use network::{ActionSink, ObjectStream};
use parking_lot::Mutex;
use registry::Reference;
use requests::RequestTable;
use session_config::SessionConfig;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// At least one side stopped sending
    Ending,
    Closed,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Peer finished sending
    End,
    /// This side finished sending
    Finish,
    /// Session failed and no open request received the error
    Error(RemoteError),
    Close,
}

#[derive(Debug, Default)]
struct Lifecycle {
    remote_ended: bool,
    local_finished: bool,
    closed: bool,
}

pub(crate) struct SessionInner {
    pub(crate) id: u64,
    me: Weak<SessionInner>,
    config: SessionConfig,
    lifecycle: Mutex<Lifecycle>,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    sink: Mutex<Option<ActionSink>>,
    requests: Mutex<RequestTable>,
    pub(crate) local: LocalContext,
    pub(crate) remote: RemoteContext,
}

impl SessionInner {
    pub(crate) fn weak(&self) -> Weak<SessionInner> {
        self.me.clone()
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lifecycle.lock().closed
    }

    /// Either side stopped sending, or the session is gone
    pub(crate) fn is_ending(&self) -> bool {
        let lifecycle = self.lifecycle.lock();
        lifecycle.closed || lifecycle.remote_ended || lifecycle.local_finished
    }

    pub(crate) fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Values the peer may change: registered by this session, or by the
    /// application context when the session is writable
    pub(crate) fn is_writable(&self, value: &Value) -> bool {
        self.local.own(value) || (self.config.writable && self.local.parent().own(value))
    }

    pub(crate) fn send(&self, action: Action) -> Result<()> {
        if self.is_closed() {
            return Err(RemoteError::session_closed("Session already destroyed"));
        }
        let sink = self.sink.lock();
        match sink.as_ref() {
            Some(sink) => Ok(sink.send(action)?),
            None => Err(RemoteError::session_closed("Session already ended")),
        }
    }

    pub(crate) fn request(&self, action: Action, timeout: Option<Duration>) -> Result<ResponseFuture> {
        let (responder, response) = ResponseFuture::channel();
        self.request_with(action, timeout, responder)?;
        Ok(response)
    }

    /// Send `action` as a request; `responder` gets the answer, the timeout
    /// or the reason the session went away
    pub(crate) fn request_with(
        &self,
        action: Action,
        timeout: Option<Duration>,
        responder: Responder,
    ) -> Result<()> {
        {
            let lifecycle = self.lifecycle.lock();
            if lifecycle.closed {
                return Err(RemoteError::session_closed("Session already destroyed"));
            }
            if lifecycle.remote_ended || lifecycle.local_finished {
                return Err(RemoteError::session_closed("Session already ended"));
            }
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let (id, start_sweep) = {
            let mut requests = self.requests.lock();
            let id = requests.register(deadline, responder)?;
            let start_sweep = deadline.is_some() && !requests.sweeping;
            if start_sweep {
                requests.sweeping = true;
            }
            (id, start_sweep)
        };
        if start_sweep {
            self.start_sweep();
        }

        debug!(session = self.id, id, action = action.name(), "request");
        let sent = self.send(Action::Request {
            id,
            action: Box::new(action),
        });
        if let Err(err) = sent {
            self.requests.lock().cancel(id);
            return Err(err);
        }
        Ok(())
    }

    fn start_sweep(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(session = self.id, "no runtime; request timeouts are not enforced");
            self.requests.lock().sweeping = false;
            return;
        };
        handle.spawn(driver::sweep(self.weak(), self.config.timeout_tick()));
    }

    pub(crate) fn handle_response(&self, id: u32, value: WireValue, rejected: bool) -> Result<()> {
        let claim = self.requests.lock().claim(id);
        match claim {
            requests::Claim::Open(responder) => {
                let outcome = self.fetch(value).and_then(|value| {
                    if rejected {
                        Err(RemoteError::from_value(value))
                    } else {
                        Ok(value)
                    }
                });
                responder(outcome);
                Ok(())
            }
            requests::Claim::Stale => {
                warn!(session = self.id, id, "response to a request no longer open");
                Ok(())
            }
            requests::Claim::Unknown => Err(RemoteError::protocol(format!(
                "Response to unknown request {}",
                id
            ))),
        }
    }

    /// Stop sending. The session closes once the peer has ended as well.
    pub(crate) fn end(&self) {
        let remote_ended = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed || lifecycle.local_finished {
                return;
            }
            lifecycle.local_finished = true;
            lifecycle.remote_ended
        };
        self.state.send_replace(SessionState::Ending);

        let sink = self.sink.lock().take();
        if let Some(sink) = sink {
            sink.finish();
        }
        debug!(session = self.id, "finished sending");
        self.emit(SessionEvent::Finish);

        if remote_ended {
            self.destroy(None);
        }
    }

    pub(crate) fn on_remote_end(&self) {
        let finished = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed || lifecycle.remote_ended {
                return;
            }
            lifecycle.remote_ended = true;
            lifecycle.local_finished
        };
        self.state.send_replace(SessionState::Ending);
        debug!(session = self.id, "peer ended");

        let pending = self.requests.lock().drain();
        for responder in pending {
            responder(Err(RemoteError::session_closed(
                "Session ended before request completed",
            )));
        }
        self.emit(SessionEvent::End);

        if finished {
            self.destroy(None);
            return;
        }
        let grace = self.config.end_timeout();
        let weak = self.weak();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(session) = weak.upgrade() {
                session.destroy(None);
            }
        });
    }

    /// Close immediately. Idempotent.
    pub(crate) fn destroy(&self, error: Option<RemoteError>) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;
        }
        self.state.send_replace(SessionState::Closed);
        drop(self.sink.lock().take());

        let pending = self.requests.lock().drain();
        let absorbed = !pending.is_empty();
        let reason = error.clone().unwrap_or_else(|| {
            RemoteError::session_closed("Session closed before request completed")
        });
        for responder in pending {
            responder(Err(reason.clone()));
        }

        if let Some(error) = error {
            warn!(session = self.id, error = %error, "session destroyed");
            if !absorbed {
                self.emit(SessionEvent::Error(error));
            }
        }
        self.emit(SessionEvent::Close);

        self.local.clear();
        self.remote.clear();
        info!(session = self.id, "session closed");
    }
}

/// Handle on a live session; clones share it
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Start a session over `stream`, serving values from `context`
    pub fn open(context: &Context, stream: ObjectStream, config: SessionConfig) -> Result<Session> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            RemoteError::type_error("Sessions must be opened inside a tokio runtime")
        })?;

        let local = LocalContext::new(context, config.assign_options())?;
        let remote_parent = context
            .registry()
            .parent()
            .cloned()
            .unwrap_or_else(|| context.environment().registry().clone());
        let (sink, source) = stream.into_parts();
        let (state, _) = watch::channel(SessionState::Open);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let inner = Arc::new_cyclic(|me: &Weak<SessionInner>| SessionInner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            me: me.clone(),
            requests: Mutex::new(RequestTable::new(config.max_open_requests)),
            config,
            lifecycle: Mutex::new(Lifecycle::default()),
            state,
            events,
            sink: Mutex::new(Some(sink)),
            local,
            remote: RemoteContext::new(me.clone(), remote_parent),
        });

        info!(
            session = inner.id,
            environment = context.environment().name(),
            writable = inner.config.writable,
            "session opened"
        );
        runtime.spawn(driver::run(inner.clone(), source));
        Ok(Session { inner })
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Session {
        Session { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn local(&self) -> &LocalContext {
        &self.inner.local
    }

    pub fn remote(&self) -> &RemoteContext {
        &self.inner.remote
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    pub fn is_ended(&self) -> bool {
        self.state() != SessionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn open_requests(&self) -> usize {
        self.inner.requests.lock().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Resolves once the session is closed
    pub async fn closed(&self) {
        let mut state = self.inner.state_receiver();
        let _ = state.wait_for(|state| *state == SessionState::Closed).await;
    }

    /// Whether the peer may change `value` through this session
    pub fn is_writable(&self, value: &Value) -> bool {
        self.inner.is_writable(value)
    }

    /// This side's value under `reference`, as the peer would resolve it
    pub fn get(&self, reference: &Reference) -> Result<Value> {
        self.inner.local.get(reference)
    }

    pub fn send(&self, action: Action) -> Result<()> {
        self.inner.send(action)
    }

    /// Request with the configured default timeout
    pub fn request(&self, action: Action) -> Result<ResponseFuture> {
        self.inner.request(action, self.inner.config.request_timeout())
    }

    pub fn request_with_timeout(
        &self,
        action: Action,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture> {
        self.inner.request(action, timeout)
    }

    /// Wire form of a value about to be sent
    pub fn dispatch(&self, value: &Value) -> Result<WireValue> {
        self.inner.dispatch(value)
    }

    /// Value named by a received wire value
    pub fn fetch(&self, value: WireValue) -> Result<Value> {
        self.inner.fetch(value)
    }

    pub fn end(&self) {
        self.inner.end();
    }

    pub fn destroy(&self, error: Option<RemoteError>) {
        self.inner.destroy(error);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("open_requests", &self.open_requests())
            .finish()
    }
}
