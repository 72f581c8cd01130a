//! # Object Streams
//!
//! An [`ObjectStream`] is an ordered, full-duplex stream of [`Action`]s split
//! into an outbound [`ActionSink`] and an inbound [`ActionSource`].
//!
//! ## Lifecycle
//!
//! - Dropping or finishing the sink ends the local write half; the peer's
//!   source yields [`StreamEvent::End`] after every action already sent.
//! - Dropping the source stops reading; background reader tasks are aborted.
//! - Transport failures surface as [`StreamEvent::Error`].

use crate::error::{Result, TransportError};
use codec::Action;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// One inbound item
#[derive(Debug)]
pub enum StreamEvent {
    Action(Action),
    /// Peer finished writing
    End,
    Error(TransportError),
}

enum SinkTarget {
    /// Actions encoded by a writer task
    Writer(mpsc::UnboundedSender<Action>),
    /// Actions delivered straight into the peer's source
    Peer(mpsc::UnboundedSender<StreamEvent>),
}

/// Outbound half
pub struct ActionSink {
    target: SinkTarget,
}

impl ActionSink {
    pub(crate) fn writer(tx: mpsc::UnboundedSender<Action>) -> Self {
        Self {
            target: SinkTarget::Writer(tx),
        }
    }

    pub(crate) fn peer(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            target: SinkTarget::Peer(tx),
        }
    }

    /// Queue one action. Never blocks; fails once the other end is gone.
    pub fn send(&self, action: Action) -> Result<()> {
        trace!(action = action.name(), "queue outbound action");
        let delivered = match &self.target {
            SinkTarget::Writer(tx) => tx.send(action).is_ok(),
            SinkTarget::Peer(tx) => tx.send(StreamEvent::Action(action)).is_ok(),
        };
        if delivered {
            Ok(())
        } else {
            Err(TransportError::closed("outbound half is closed"))
        }
    }

    /// True once the receiving end has gone away
    pub fn is_closed(&self) -> bool {
        match &self.target {
            SinkTarget::Writer(tx) => tx.is_closed(),
            SinkTarget::Peer(tx) => tx.is_closed(),
        }
    }

    /// End the local write half after everything already queued
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for ActionSink {
    fn drop(&mut self) {
        if let SinkTarget::Peer(tx) = &self.target {
            let _ = tx.send(StreamEvent::End);
        }
    }
}

/// Inbound half
pub struct ActionSource {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    reader: Option<JoinHandle<()>>,
}

impl ActionSource {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<StreamEvent>,
        reader: Option<JoinHandle<()>>,
    ) -> Self {
        Self { events, reader }
    }

    /// Next inbound event; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }
}

impl Drop for ActionSource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Full-duplex action stream
pub struct ObjectStream {
    pub sink: ActionSink,
    pub source: ActionSource,
}

impl ObjectStream {
    pub fn new(sink: ActionSink, source: ActionSource) -> Self {
        Self { sink, source }
    }

    pub fn into_parts(self) -> (ActionSink, ActionSource) {
        (self.sink, self.source)
    }

    /// Two in-memory streams wired to each other. Actions cross without
    /// encoding.
    pub fn pair() -> (ObjectStream, ObjectStream) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (
            ObjectStream::new(ActionSink::peer(b_tx), ActionSource::new(a_rx, None)),
            ObjectStream::new(ActionSink::peer(a_tx), ActionSource::new(b_rx, None)),
        )
    }
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("sink_closed", &self.sink.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::Reference;

    #[tokio::test]
    async fn test_pair_delivers_in_order_then_end() {
        let (left, mut right) = ObjectStream::pair();
        for id in 1..=3u64 {
            left.sink
                .send(Action::Get {
                    reference: Reference::Id(id),
                })
                .unwrap();
        }
        left.sink.finish();

        for id in 1..=3u64 {
            match right.source.recv().await {
                Some(StreamEvent::Action(Action::Get { reference })) => {
                    assert_eq!(reference, Reference::Id(id))
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert!(matches!(right.source.recv().await, Some(StreamEvent::End)));
    }

    #[tokio::test]
    async fn test_send_fails_after_peer_source_dropped() {
        let (left, right) = ObjectStream::pair();
        drop(right);
        assert!(left.sink.is_closed());
        assert!(left.sink.send(Action::UndefinedValue).is_err());
    }
}
