//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::time::Duration;

/// Default delay between two remote fetches of the same note, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default delay between two remote fetches of the same note.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(DEFAULT_POLL_INTERVAL_MS);

/// Default bound on a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// What the poller registry does once it holds many keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Keep every poller until the engine shuts down.
    #[default]
    Never,
    /// Keep at most this many pollers, stopping the least recently accessed
    /// one to make room for a new key.
    MaxEntries(usize),
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server URL, e.g. `https://notes.example.com`.
    pub base_url: String,
    /// Delay between fetch ticks for one note.
    pub poll_interval: Duration,
    /// Bound on each fetch and each outbound write.
    pub request_timeout: Duration,
    /// Registry eviction policy.
    pub eviction: EvictionPolicy,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            eviction: EvictionPolicy::Never,
        }
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the registry eviction policy.
    pub fn with_eviction(mut self, eviction: EvictionPolicy) -> Self {
        self.eviction = eviction;
        self
    }

    /// Checks that the configuration can drive a poller.
    pub fn validate(&self) -> SyncResult<()> {
        if self.poll_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }
        if self.eviction == EvictionPolicy::MaxEntries(0) {
            return Err(SyncError::InvalidConfig(
                "registry capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
