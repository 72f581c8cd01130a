//! # Session Configuration
//!
//! Settings shared by every session opened from a context.
//!
//! ## Usage
//!
//! ```rust
//! use session_config::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::default()
//!     .with_writable(true)
//!     .with_request_timeout(Some(Duration::from_secs(5)));
//! config.validate().unwrap();
//! ```

pub mod session;

pub use session::{
    InvalidConfig, SessionConfig, DEFAULT_END_TIMEOUT_MS, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_TIMEOUT_TICK_MS, ENV_PREFIX, MAX_OPEN_REQUESTS,
};
