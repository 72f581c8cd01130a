//! Background tasks of a session: the inbound read loop and the request
//! timeout sweep.

use super::{SessionInner, SessionState};
use crate::error::RemoteError;
use network::{ActionSource, StreamEvent};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Execute inbound actions in arrival order until the session closes
pub(super) async fn run(session: Arc<SessionInner>, mut source: ActionSource) {
    let mut state = session.state_receiver();
    loop {
        let event = tokio::select! {
            biased;
            _ = state.wait_for(|state| *state == SessionState::Closed) => break,
            event = source.recv() => event,
        };

        match event {
            Some(StreamEvent::Action(action)) => {
                trace!(session = session.id, action = action.name(), "inbound");
                if let Err(err) = session.exec(action) {
                    warn!(session = session.id, error = %err, "inbound action failed");
                    session.destroy(Some(err));
                    break;
                }
            }
            Some(StreamEvent::Error(err)) => {
                session.destroy(Some(err.into()));
                break;
            }
            Some(StreamEvent::End) | None => {
                session.on_remote_end();
                // keep the session alive until the end timeout fires
                let _ = state.wait_for(|state| *state == SessionState::Closed).await;
                break;
            }
        }
    }
    debug!(session = session.id, "driver stopped");
}

/// Fail requests past their deadline, checking every `tick`. Stops once no
/// open request has a deadline.
pub(super) async fn sweep(session: Weak<SessionInner>, tick: Duration) {
    loop {
        tokio::time::sleep(tick).await;
        let Some(session) = session.upgrade() else {
            return;
        };

        let (expired, keep_going) = {
            let mut requests = session.requests.lock();
            let expired = requests.expire(Instant::now());
            let keep_going = requests.has_deadlines();
            if !keep_going {
                requests.sweeping = false;
            }
            (expired, keep_going)
        };

        if !expired.is_empty() {
            debug!(session = session.id, count = expired.len(), "requests timed out");
        }
        for responder in expired {
            responder(Err(RemoteError::timeout()));
        }
        if !keep_going {
            return;
        }
    }
}
