//! Open-request bookkeeping: id allocation, responders and deadlines.

use crate::error::{RemoteError, Result};
use crate::value::Value;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Receives the outcome of one request, exactly once
pub(crate) type Responder = Box<dyn FnOnce(Result<Value>) + Send>;

struct PendingRequest {
    seq: u64,
    deadline: Option<Instant>,
    responder: Responder,
}

/// What to do with a response id
pub(crate) enum Claim {
    Open(Responder),
    /// Issued by this table but no longer open (timed out, cancelled or
    /// already answered); the answer is dropped
    Stale,
    /// Never issued
    Unknown,
}

pub(crate) struct RequestTable {
    pending: HashMap<u32, PendingRequest>,
    first_id: u32,
    next_id: u32,
    /// Ids the cursor has moved past since `first_id`
    issued: u64,
    next_seq: u64,
    max_open: u64,
    /// A sweep task is running
    pub(crate) sweeping: bool,
}

impl RequestTable {
    pub(crate) fn new(max_open: u64) -> Self {
        Self::starting_at(max_open, rand::random())
    }

    fn starting_at(max_open: u64, first_id: u32) -> Self {
        Self {
            pending: HashMap::new(),
            first_id,
            next_id: first_id,
            issued: 0,
            next_seq: 0,
            max_open,
            sweeping: false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn register(&mut self, deadline: Option<Instant>, responder: Responder) -> Result<u32> {
        if self.pending.len() as u64 >= self.max_open {
            return Err(RemoteError::range(format!(
                "Maximum open requests reached: {}",
                self.max_open
            )));
        }

        let id = loop {
            let candidate = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            self.issued += 1;
            if candidate != 0 && !self.pending.contains_key(&candidate) {
                break candidate;
            }
        };

        self.pending.insert(
            id,
            PendingRequest {
                seq: self.next_seq,
                deadline,
                responder,
            },
        );
        self.next_seq += 1;
        Ok(id)
    }

    pub(crate) fn claim(&mut self, id: u32) -> Claim {
        if let Some(request) = self.pending.remove(&id) {
            return Claim::Open(request.responder);
        }
        if self.was_issued(id) {
            Claim::Stale
        } else {
            Claim::Unknown
        }
    }

    fn was_issued(&self, id: u32) -> bool {
        id != 0
            && (self.issued > u32::MAX as u64
                || (id.wrapping_sub(self.first_id) as u64) < self.issued)
    }

    /// Remove a request without answering it
    pub(crate) fn cancel(&mut self, id: u32) {
        self.pending.remove(&id);
    }

    /// Requests past their deadline, oldest first
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<Responder> {
        let ids: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, request)| request.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| *id)
            .collect();

        let mut expired: Vec<(u64, Responder)> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(request) = self.pending.remove(&id) {
                expired.push((request.seq, request.responder));
            }
        }
        expired.sort_by_key(|(seq, _)| *seq);
        expired.into_iter().map(|(_, responder)| responder).collect()
    }

    pub(crate) fn has_deadlines(&self) -> bool {
        self.pending.values().any(|request| request.deadline.is_some())
    }

    /// Every open request, oldest first
    pub(crate) fn drain(&mut self) -> Vec<Responder> {
        let mut all: Vec<(u64, Responder)> = self
            .pending
            .drain()
            .map(|(_, request)| (request.seq, request.responder))
            .collect();
        all.sort_by_key(|(seq, _)| *seq);
        all.into_iter().map(|(_, responder)| responder).collect()
    }
}

/// Outcome of a request sent with [`super::Session::request`]
pub struct ResponseFuture {
    rx: oneshot::Receiver<Result<Value>>,
}

impl ResponseFuture {
    pub(crate) fn channel() -> (Responder, Self) {
        let (tx, rx) = oneshot::channel();
        let responder: Responder = Box::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        (responder, Self { rx })
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx.poll_unpin(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(RemoteError::session_closed(
                    "Session closed before request completed",
                ))
            })
        })
    }
}
