//! # Remote Context Protocol Codec
//!
//! ## Purpose
//!
//! The "rules" layer of the protocol: which actions exist, how each maps to
//! a positional argument list, and how that list becomes bytes.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/registry → [codec] → network/ → context/
//!       ↑            ↓          ↓           ↓
//!   Reference    Action tags  Framed     Executes
//!   handles      Arguments    streams    actions
//! ```
//!
//! ## What This Crate Contains
//! - [`ActionTag`] registry and [`ACTION_TABLE`]
//! - Typed [`Action`], [`WireValue`] and [`DescriptorArgs`]
//! - Trailing-default trimming of argument lists
//! - Length-prefixed frame encoding and an incremental [`FrameDecoder`]
//!
//! ## What This Crate Does NOT Contain
//! - Action execution semantics (belongs in the context crate)
//! - Socket or task management (belongs in network/)

pub mod action;
pub mod arguments;
pub mod error;
pub mod frame;
pub mod tag;

pub use action::{Action, CacheList, DescriptorArgs, DescriptorList, ObjectClass, WireValue};
pub use arguments::{trim_arguments, ArgumentReader, Token, MAX_NESTING};
pub use error::{ProtocolError, Result};
pub use frame::{
    decode_payload, encode_frame, encode_payload, FrameDecoder, DEFAULT_MAX_FRAME_SIZE,
    LENGTH_PREFIX_SIZE,
};
pub use tag::{ActionTag, ACTION_TABLE};
