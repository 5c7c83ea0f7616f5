//! Error types for the NCID client

use thiserror::Error;

/// Result alias used throughout the crate
pub type NcidResult<T> = Result<T, NcidError>;

/// Errors surfaced by the NCID client.
///
/// None of these are fatal to a running session. Link failures drive a
/// reconnect; malformed lines are skipped inside the session as a
/// [`ParseError`](crate::ParseError) and never reach this type.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NcidError {
    /// Socket-level failure (DNS, refused, reset)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connect or read did not complete in time
    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A line exceeded the framing limit without a newline
    #[error("line too long: {len} bytes exceeds limit {limit}")]
    LineTooLong { len: usize, limit: usize },

    /// Lines were dropped because the consumer fell behind
    #[error("line queue full, lines dropped")]
    QueueFull,

    /// The connection was stopped while a read was in flight
    #[error("connection stopped")]
    Cancelled,

    /// Configuration rejected by [`NcidConfig::validate`](crate::NcidConfig::validate)
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration document is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NcidError {
    /// Build an [`NcidError::InvalidConfig`].
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        NcidError::InvalidConfig {
            reason: reason.into(),
        }
    }
}
