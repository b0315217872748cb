//! Settings context configuration
//!
//! Timeout/retry policy for the requester role and the optional register
//! handshake. Values can be overridden from a JSON document or restored
//! from a compact postcard blob.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Requester and registration policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    // --- Requester ---
    /// Per-attempt reply deadline in milliseconds
    pub request_timeout_ms: u32,
    /// Total number of sends (first try included) before `Timeout`
    pub request_attempts: u8,
    /// Longest single `wait` call while a request is pending (milliseconds)
    pub wait_slice_ms: u32,

    // --- Registration ---
    /// Announce every exposed setting to a settings daemon on registration
    pub announce_on_register: bool,

    // --- Watch ---
    /// Drop update broadcasts that carry this node's own sender id
    pub ignore_own_broadcasts: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            // Requester
            request_timeout_ms: 500,
            request_attempts: 5,
            wait_slice_ms: 10,

            // Registration
            announce_on_register: false,

            // Watch
            ignore_own_broadcasts: true,
        }
    }
}

impl SettingsConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60_000).contains(&self.request_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "request_timeout_ms must be 1–60000",
            ));
        }
        if !(1..=32).contains(&self.request_attempts) {
            return Err(ConfigError::ValidationFailed(
                "request_attempts must be 1–32",
            ));
        }
        if self.wait_slice_ms == 0 || self.wait_slice_ms > self.request_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "wait_slice_ms must be 1–request_timeout_ms",
            ));
        }
        Ok(())
    }

    /// Parse a JSON override document. Missing fields keep their defaults.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_slice(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Encode as a compact postcard blob.
    pub fn to_blob(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Corrupted)
    }

    /// Decode and validate a postcard blob produced by [`to_blob`](Self::to_blob).
    pub fn from_blob(bytes: &[u8]) -> Result<Self, ConfigError> {
        let cfg: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Errors from loading or validating a [`SettingsConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The document or blob could not be decoded.
    Corrupted,
    /// A field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}
