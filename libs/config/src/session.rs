//! Session Configuration Module
//!
//! Per-session protocol settings: request deadlines, shutdown grace, the
//! writable flag and resource ceilings. Loads from an optional TOML file with
//! environment variable overrides (`REMOTE_CONTEXT_*`).

use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use registry::{AssignOptions, DEFAULT_MAX_REFERENCES, MAX_SAFE_ID};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 20_000;
pub const DEFAULT_END_TIMEOUT_MS: u64 = 200;
pub const DEFAULT_TIMEOUT_TICK_MS: u64 = 100;
/// 256⁴ simultaneously open requests
pub const MAX_OPEN_REQUESTS: u64 = 1 << 32;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "REMOTE_CONTEXT";

/// Rejected configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid \"{field}\" option: {reason}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub reason: String,
}

impl InvalidConfig {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Default request deadline; `None` or `0` waits forever
    pub request_timeout_ms: Option<u64>,
    /// Grace period between the peer ending and the session closing
    pub end_timeout_ms: u64,
    /// Period of the request timeout sweep
    pub timeout_tick_ms: u64,
    /// Let the peer mutate values owned by the context the session was
    /// opened from
    pub writable: bool,
    pub max_open_requests: u64,
    /// Live handles allowed per context chain
    pub max_references: u64,
    /// Highest minted reference id before wrapping to 1
    pub reference_id_ceiling: u64,
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            end_timeout_ms: DEFAULT_END_TIMEOUT_MS,
            timeout_tick_ms: DEFAULT_TIMEOUT_TICK_MS,
            writable: false,
            max_open_requests: MAX_OPEN_REQUESTS,
            max_references: DEFAULT_MAX_REFERENCES,
            reference_id_ceiling: MAX_SAFE_ID,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl SessionConfig {
    /// Load from an optional file layered under `REMOTE_CONTEXT_*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Same as [`SessionConfig::load`] with a custom variable prefix
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading session config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // Single underscores belong to field names; nesting uses "__"
        builder = builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SessionConfig = builder
            .build()
            .context("Failed to build session configuration")?
            .try_deserialize()
            .context("Failed to deserialize session configuration")?;

        config.validate()?;
        debug!(?config, "session configuration loaded");
        Ok(config)
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: SessionConfig =
            toml::from_str(source).context("Failed to parse session configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize session configuration")
    }

    pub fn validate(&self) -> std::result::Result<(), InvalidConfig> {
        if self.timeout_tick_ms == 0 {
            return Err(InvalidConfig::new("timeout_tick_ms", "must be positive"));
        }
        if self.max_open_requests == 0 || self.max_open_requests > MAX_OPEN_REQUESTS {
            return Err(InvalidConfig::new(
                "max_open_requests",
                format!("must be within 1..={}", MAX_OPEN_REQUESTS),
            ));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(InvalidConfig::new(
                "max_frame_size",
                "must fit a 32-bit length prefix",
            ));
        }
        self.assign_options()
            .validate()
            .map_err(|e| InvalidConfig::new("max_references", e.to_string()))
    }

    /// Effective default request deadline
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_ms {
            Some(0) | None => None,
            Some(ms) => Some(Duration::from_millis(ms)),
        }
    }

    pub fn end_timeout(&self) -> Duration {
        Duration::from_millis(self.end_timeout_ms)
    }

    pub fn timeout_tick(&self) -> Duration {
        Duration::from_millis(self.timeout_tick_ms)
    }

    pub fn assign_options(&self) -> AssignOptions {
        AssignOptions {
            max_references: self.max_references,
            id_ceiling: self.reference_id_ceiling,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_end_timeout(mut self, timeout: Duration) -> Self {
        self.end_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_timeout_tick(mut self, tick: Duration) -> Self {
        self.timeout_tick_ms = tick.as_millis() as u64;
        self
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    pub fn with_max_open_requests(mut self, max: u64) -> Self {
        self.max_open_requests = max;
        self
    }

    pub fn with_max_references(mut self, max: u64) -> Self {
        self.max_references = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(20)));
        assert_eq!(config.end_timeout(), Duration::from_millis(200));
        assert_eq!(config.timeout_tick(), Duration::from_millis(100));
        assert!(!config.writable);
        assert_eq!(config.max_open_requests, 256u64.pow(4));
        assert_eq!(config.max_references, 65_536);
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_timeout_means_forever() {
        let config = SessionConfig::default().with_request_timeout(Some(Duration::ZERO));
        assert_eq!(config.request_timeout(), None);
        let config = SessionConfig::default().with_request_timeout(None);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_load_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(
            &path,
            r#"
writable = true
request_timeout_ms = 50
"#,
        )
        .unwrap();

        let config = SessionConfig::load_with_prefix(Some(&path), "RC_TEST_FILE").unwrap();
        assert!(config.writable);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(config.end_timeout_ms, DEFAULT_END_TIMEOUT_MS);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "end_timeout_ms = 10\n").unwrap();

        std::env::set_var("RC_TEST_ENV_END_TIMEOUT_MS", "75");
        let config = SessionConfig::load_with_prefix(Some(&path), "RC_TEST_ENV");
        std::env::remove_var("RC_TEST_ENV_END_TIMEOUT_MS");

        assert_eq!(config.unwrap().end_timeout_ms, 75);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SessionConfig::from_toml_str("timeout_tick_ms = 0").unwrap_err();
        assert!(err.to_string().contains("timeout_tick_ms"));

        let config = SessionConfig::default().with_max_open_requests(0);
        assert_eq!(config.validate().unwrap_err().field, "max_open_requests");

        let config = SessionConfig {
            max_references: 10,
            reference_id_ceiling: 5,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_settings() {
        let config = SessionConfig::default()
            .with_writable(true)
            .with_max_references(128);
        let text = config.to_toml_string().unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), config);
    }
}
