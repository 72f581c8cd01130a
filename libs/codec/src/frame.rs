//! # Frame Encoding
//!
//! One action per frame:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ length: u32 (BE) │ bincode(Token) payload       │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! [`FrameDecoder`] accumulates partial reads and yields complete actions.

use crate::action::Action;
use crate::arguments::{Token, MAX_NESTING};
use crate::error::{ProtocolError, Result};
use byteorder::{BigEndian, ByteOrder};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default cap on a single frame payload (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Serialize an action payload without the length prefix. Trees nested
/// deeper than [`MAX_NESTING`] are refused since the peer would reject them.
pub fn encode_payload(action: &Action) -> Result<Vec<u8>> {
    let token = action.to_token();
    let depth = token.depth();
    if depth > MAX_NESTING {
        return Err(ProtocolError::NestingTooDeep {
            depth,
            max: MAX_NESTING,
        });
    }
    Ok(bincode::serialize(&token)?)
}

/// Parse a payload produced by [`encode_payload`]. Nesting past
/// [`MAX_NESTING`] is a serialization error.
pub fn decode_payload(payload: &[u8]) -> Result<Action> {
    let token: Token = bincode::deserialize(payload)?;
    Action::from_token(token)
}

/// Length-prefixed frame for one action
pub fn encode_frame(action: &Action, max_frame_size: usize) -> Result<Bytes> {
    let payload = encode_payload(action)?;
    if payload.len() > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_size,
        });
    }

    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    BigEndian::write_u32(&mut prefix, payload.len() as u32);
    frame.put_slice(&prefix);
    frame.put_slice(&payload);
    Ok(frame.freeze())
}

/// Incremental decoder over a byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete action, `None` while the frame is still partial
    pub fn next_action(&mut self) -> Result<Option<Action>> {
        if self.buffer.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let length = BigEndian::read_u32(&self.buffer[..LENGTH_PREFIX_SIZE]) as usize;
        check_frame_length(length, self.max_frame_size)?;
        if self.buffer.len() < LENGTH_PREFIX_SIZE + length {
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX_SIZE);
        let payload = self.buffer.split_to(length);
        decode_payload(&payload).map(Some)
    }
}

/// Reject declared lengths above the configured maximum
fn check_frame_length(length: usize, max_frame_size: usize) -> Result<()> {
    if length > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: max_frame_size,
        });
    }
    Ok(())
}
