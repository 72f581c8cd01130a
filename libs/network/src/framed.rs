//! # Framed Transport
//!
//! Runs an [`ObjectStream`] over any tokio byte stream (TCP, Unix socket,
//! in-memory duplex). Each action is one length-prefixed frame; see
//! [`codec::frame`].
//!
//! Two background tasks own the IO halves: a reader feeding a
//! [`FrameDecoder`] and turning complete frames into [`StreamEvent`]s and a writer encoding queued actions. The writer shuts the
//! write half down once the sink is dropped and its queue drained, which the
//! peer observes as end-of-stream.

use crate::error::TransportError;
use crate::stream::{ActionSink, ActionSource, ObjectStream, StreamEvent};
use bytes::BytesMut;
use codec::{encode_frame, Action, FrameDecoder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use codec::DEFAULT_MAX_FRAME_SIZE;

impl ObjectStream {
    /// Wrap a byte stream. Must be called inside a tokio runtime.
    pub fn framed<T>(io: T, max_frame_size: usize) -> ObjectStream
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_frames(read_half, event_tx.clone(), max_frame_size));
        tokio::spawn(write_frames(write_half, action_rx, event_tx, max_frame_size));

        ObjectStream::new(
            ActionSink::writer(action_tx),
            ActionSource::new(event_rx, Some(reader)),
        )
    }
}

/// Bytes requested from the reader per poll
const READ_CHUNK: usize = 8 * 1024;

async fn read_frames<R>(
    mut reader: R,
    events: mpsc::UnboundedSender<StreamEvent>,
    max_frame_size: usize,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new(max_frame_size);
    let mut chunk = BytesMut::with_capacity(READ_CHUNK);
    loop {
        loop {
            match decoder.next_action() {
                Ok(Some(action)) => {
                    if events.send(StreamEvent::Action(action)).is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, pending = decoder.pending(), "dropping stream after undecodable frame");
                    let _ = events.send(StreamEvent::Error(e.into()));
                    return;
                }
            }
        }

        chunk.clear();
        match reader.read_buf(&mut chunk).await {
            Ok(0) if decoder.pending() == 0 => {
                debug!("peer closed its write half");
                let _ = events.send(StreamEvent::End);
                return;
            }
            Ok(0) => {
                let _ = events.send(StreamEvent::Error(TransportError::closed(format!(
                    "Stream ended inside a frame with {} bytes buffered",
                    decoder.pending()
                ))));
                return;
            }
            Ok(_) => decoder.extend(&chunk),
            Err(e) => {
                let _ = events.send(StreamEvent::Error(TransportError::io(
                    "Failed to read frame",
                    e,
                )));
                return;
            }
        }
    }
}

async fn write_frames<W>(
    mut writer: W,
    mut actions: mpsc::UnboundedReceiver<Action>,
    events: mpsc::UnboundedSender<StreamEvent>,
    max_frame_size: usize,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(action) = actions.recv().await {
        let frame = match encode_frame(&action, max_frame_size) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = events.send(StreamEvent::Error(e.into()));
                return;
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            let _ = events.send(StreamEvent::Error(TransportError::io(
                "Failed to write frame",
                e,
            )));
            return;
        }
        if let Err(e) = writer.flush().await {
            let _ = events.send(StreamEvent::Error(TransportError::io("Failed to flush", e)));
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "write half shutdown failed");
    }
}
