//! Client configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config
//! pointing at `localhost:3333`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_DISPLAY_NAME, DEFAULT_NCID_HOST, DEFAULT_NCID_PORT, DEFAULT_RETRY_INITIAL_MS,
    DEFAULT_RETRY_MAX_MS, DEFAULT_TIMEOUT_MS, MAX_LINE_QUEUE_SIZE,
};
use crate::error::{NcidError, NcidResult};

fn default_host() -> String {
    DEFAULT_NCID_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_NCID_PORT
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_line_queue_size() -> usize {
    MAX_LINE_QUEUE_SIZE
}

fn default_retry_initial_ms() -> u64 {
    DEFAULT_RETRY_INITIAL_MS
}

fn default_retry_max_ms() -> u64 {
    DEFAULT_RETRY_MAX_MS
}

/// Reconnect backoff.
///
/// The delay before attempt `n` (0-based) is `initial_delay_ms * 2^n`, capped
/// at `max_delay_ms`. The attempt counter resets after every successful
/// connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    #[serde(default = "default_retry_initial_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_RETRY_INITIAL_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_MS,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before reconnect attempt `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 1u64
            .checked_shl(attempt)
            .unwrap_or(u64::MAX);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(multiplier)
                .min(self.max_delay_ms),
        )
    }
}

/// Settings for one gateway connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NcidConfig {
    /// NCID server host name or address
    #[serde(default = "default_host")]
    pub host: String,

    /// NCID server TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Name of the monitored line, used in logs
    #[serde(default = "default_display_name")]
    pub display_name: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Reconnect when the socket is silent this long. 0 disables the check;
    /// NCID servers do not send keepalives by default.
    #[serde(default)]
    pub liveness_timeout_ms: u64,

    /// Capacity of the channel delivering lines to the session
    #[serde(default = "default_line_queue_size")]
    pub line_queue_size: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for NcidConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            display_name: default_display_name(),
            connect_timeout_ms: default_connect_timeout_ms(),
            liveness_timeout_ms: 0,
            line_queue_size: default_line_queue_size(),
            retry: RetryPolicy::default(),
        }
    }
}

impl NcidConfig {
    /// Config for `host:port` with everything else defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Builder-style display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Builder-style retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(s: &str) -> NcidResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the connection manager cannot work with.
    pub fn validate(&self) -> NcidResult<()> {
        if self
            .host
            .trim()
            .is_empty()
        {
            return Err(NcidError::invalid_config("host must not be empty"));
        }
        if self.port == 0 {
            return Err(NcidError::invalid_config("port must be non-zero"));
        }
        if self
            .display_name
            .trim()
            .is_empty()
        {
            return Err(NcidError::invalid_config("display_name must not be empty"));
        }
        if self.line_queue_size == 0 {
            return Err(NcidError::invalid_config("line_queue_size must be at least 1"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(NcidError::invalid_config("connect_timeout_ms must be non-zero"));
        }
        if self
            .retry
            .initial_delay_ms
            == 0
        {
            return Err(NcidError::invalid_config("retry.initial_delay_ms must be non-zero"));
        }
        if self
            .retry
            .initial_delay_ms
            > self
                .retry
                .max_delay_ms
        {
            return Err(NcidError::invalid_config(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry
                    .initial_delay_ms,
                self.retry
                    .max_delay_ms
            )));
        }
        Ok(())
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn liveness_timeout(&self) -> Option<Duration> {
        (self.liveness_timeout_ms > 0).then(|| Duration::from_millis(self.liveness_timeout_ms))
    }
}
