//! Connection configuration: backoff policy, liveness timeouts and channel
//! sizes.

use std::time::Duration;

use tracing::warn;

// ---------------------------------------------------------------------------
// BackoffPolicy
// ---------------------------------------------------------------------------

/// Exponential backoff between reconnect attempts.
///
/// The delay before attempt `n` (1-based: the first *retry* is attempt 1)
/// is `min(base_delay * 2^n, max_delay)`. With the defaults:
///
/// | attempt | delay  |
/// |---------|--------|
/// | 1       | 2 s    |
/// | 2       | 4 s    |
/// | 3       | 8 s    |
/// | 4+      | 10 s   |
///
/// No jitter and no attempt limit: the supervisor retries until told to
/// stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Multiplied by `2^attempt`.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl BackoffPolicy {
    /// The delay to wait before reconnect attempt `attempt`.
    ///
    /// Saturates instead of overflowing, so huge attempt counts simply
    /// yield `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Returns a policy with `max_delay >= base_delay`.
    pub fn validated(mut self) -> Self {
        if self.max_delay < self.base_delay {
            warn!(
                base_ms = self.base_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "max_delay below base_delay, raising it"
            );
            self.max_delay = self.base_delay;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ConnectionConfig
// ---------------------------------------------------------------------------

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Configuration for a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Reconnect timing.
    pub backoff: BackoffPolicy,

    /// How long one connect attempt may take. An attempt that runs out of
    /// time counts as failed and is followed by a backoff.
    pub connect_timeout: Duration,

    /// A connection that receives nothing for this long is treated as
    /// dropped.
    pub idle_timeout: Duration,

    /// How often an idle connection sends a `ping`. Must be shorter than
    /// `idle_timeout` so a healthy server always answers in time.
    pub ping_interval: Duration,

    /// How long a request waits for its reply before giving up.
    pub request_timeout: Duration,

    /// Capacity of the request channel into the supervisor.
    pub command_buffer: usize,

    /// Capacity of the close-event and server-push broadcast channels.
    /// Slow subscribers past this many events see `Lagged`.
    pub event_buffer: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            request_timeout: Duration::from_secs(10),
            command_buffer: 64,
            event_buffer: 64,
        }
    }
}

impl ConnectionConfig {
    /// Clamps values Tokio's channels and timers would panic on, and keeps
    /// `ping_interval` below `idle_timeout`.
    pub fn validated(mut self) -> Self {
        self.backoff = self.backoff.validated();
        if self.connect_timeout.is_zero() {
            warn!("connect_timeout must be positive, using the default");
            self.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        }
        if self.idle_timeout.is_zero() {
            warn!("idle_timeout must be positive, using the default");
            self.idle_timeout = DEFAULT_IDLE_TIMEOUT;
        }
        if self.ping_interval.is_zero() || self.ping_interval >= self.idle_timeout {
            let adjusted = (self.idle_timeout / 2).max(Duration::from_millis(1));
            warn!(
                ping_interval_ms = self.ping_interval.as_millis() as u64,
                idle_timeout_ms = self.idle_timeout.as_millis() as u64,
                adjusted_ms = adjusted.as_millis() as u64,
                "ping_interval must be positive and below idle_timeout"
            );
            self.ping_interval = adjusted;
        }
        if self.command_buffer == 0 {
            warn!("command_buffer must be at least 1, using 1");
            self.command_buffer = 1;
        }
        if self.event_buffer == 0 {
            warn!("event_buffer must be at least 1, using 1");
            self.event_buffer = 1;
        }
        self
    }
}
