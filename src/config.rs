//! Connection configuration.
//!
//! Values are clamped to their lower bounds instead of being rejected so a
//! configuration is always usable.

use std::time::Duration;

/// Smallest accepted polling interval or read timeout.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

const DEFAULT_BUFFER_CAPACITY: usize = 1;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Tunables for a [`StreamingConnection`](crate::StreamingConnection).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    buffer_capacity: usize,
    poll_interval: Duration,
    read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Set the inbound buffer capacity. Values below one are raised to one.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    /// Set how long each `stream()` poll waits before re-checking state.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set how long each listener read waits before checking for shutdown.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout.max(MIN_INTERVAL);
        self
    }

    /// Configured inbound buffer capacity.
    #[must_use]
    pub fn buffer_capacity_value(&self) -> usize { self.buffer_capacity }

    /// Configured `stream()` polling interval.
    #[must_use]
    pub fn poll_interval_value(&self) -> Duration { self.poll_interval }

    /// Configured listener read timeout.
    #[must_use]
    pub fn read_timeout_value(&self) -> Duration { self.read_timeout }
}
