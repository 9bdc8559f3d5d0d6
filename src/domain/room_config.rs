//! Room timing and sizing parameters.
//!
//! [`RoomConfig`] is fixed when a room is constructed. The keepalive
//! cadence is derived from `pong_wait` so that a ping is always sent
//! before the peer's pong deadline runs out.

use std::time::Duration;

use tokio::time::Instant;

/// Default byte cap on inbound frames.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512;

/// Default time allowed to complete a single frame write.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Default time allowed between two pongs from the peer.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Default ping cadence (`9 * DEFAULT_PONG_WAIT / 10`).
pub const DEFAULT_PING_PERIOD: Duration = Duration::from_secs(54);

/// Default grace interval after which an empty room stops its actor.
pub const DEFAULT_IDLE_SHUTDOWN: Duration = Duration::from_secs(300);

/// Default number of messages buffered per connection before eviction.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 16;

/// Default number of pending broadcasts a room accepts before publishers wait.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Longest accepted idle shutdown: the largest interval whose nanosecond
/// count fits the signed 64-bit `idle_shutdown_ns` column.
pub const MAX_IDLE_SHUTDOWN: Duration = Duration::from_nanos(i64::MAX as u64);

/// Lower bound for the derived ping period; `tokio` intervals reject zero.
const MIN_PING_PERIOD: Duration = Duration::from_millis(1);

/// Stand-in for "never" when a deadline would overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Immutable per-room parameters.
///
/// `idle_shutdown == Duration::ZERO` disables idle shutdown: the actor
/// then only stops on an explicit close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Byte cap on a single inbound frame.
    pub max_message_size: usize,
    /// Interval after which an actor with no connections exits.
    pub idle_shutdown: Duration,
    /// Maximum time to complete a single write.
    pub write_wait: Duration,
    /// Maximum time between two pongs.
    pub pong_wait: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Capacity of the room's broadcast intake.
    pub broadcast_capacity: usize,
}

impl RoomConfig {
    /// Creates a config with the given size cap and idle interval and
    /// default timings for everything else.
    #[must_use]
    pub const fn new(max_message_size: usize, idle_shutdown: Duration) -> Self {
        Self {
            max_message_size,
            idle_shutdown,
            write_wait: DEFAULT_WRITE_WAIT,
            pong_wait: DEFAULT_PONG_WAIT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }

    /// Returns a copy with a different size cap and idle interval, keeping
    /// the timings of `self`. Stores use this to stamp per-room values onto
    /// their template.
    #[must_use]
    pub const fn with_limits(mut self, max_message_size: usize, idle_shutdown: Duration) -> Self {
        self.max_message_size = max_message_size;
        self.idle_shutdown = idle_shutdown;
        self
    }

    /// Sets the write timeout.
    #[must_use]
    pub const fn with_write_wait(mut self, write_wait: Duration) -> Self {
        self.write_wait = write_wait;
        self
    }

    /// Sets the pong timeout. The ping period follows from it.
    #[must_use]
    pub const fn with_pong_wait(mut self, pong_wait: Duration) -> Self {
        self.pong_wait = pong_wait;
        self
    }

    /// Sets the outbound queue size (clamped to at least 1).
    #[must_use]
    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Sets the broadcast intake size (clamped to at least 1).
    #[must_use]
    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity.max(1);
        self
    }

    /// Interval between keepalive pings: nine tenths of `pong_wait`.
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.pong_wait
            .checked_mul(9)
            .map_or_else(|| (self.pong_wait / 10).saturating_mul(9), |d| d / 10)
            .max(MIN_PING_PERIOD)
    }

    /// Idle interval, or `None` when idle shutdown is disabled.
    #[must_use]
    pub fn idle_interval(&self) -> Option<Duration> {
        (!self.idle_shutdown.is_zero()).then_some(self.idle_shutdown)
    }
}

/// The instant `after` from now, saturating at a far-future deadline
/// instead of overflowing the clock.
pub(crate) fn deadline_after(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_IDLE_SHUTDOWN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ping_period_matches_constant() {
        assert_eq!(RoomConfig::default().ping_period(), DEFAULT_PING_PERIOD);
    }

    #[test]
    fn ping_period_is_shorter_than_pong_wait() {
        for ms in [10, 250, 1_000, 60_000] {
            let cfg = RoomConfig::default().with_pong_wait(Duration::from_millis(ms));
            assert!(cfg.ping_period() < cfg.pong_wait);
        }
    }

    #[test]
    fn zero_pong_wait_keeps_a_positive_ping_period() {
        let cfg = RoomConfig::default().with_pong_wait(Duration::ZERO);
        assert_eq!(cfg.ping_period(), MIN_PING_PERIOD);
    }

    #[test]
    fn huge_pong_wait_saturates_instead_of_overflowing() {
        let cfg = RoomConfig::default().with_pong_wait(Duration::MAX);
        assert!(cfg.ping_period() < cfg.pong_wait);
        assert!(cfg.ping_period() > Duration::from_secs(u64::MAX / 2));
    }

    #[tokio::test]
    async fn deadlines_saturate() {
        let soon = deadline_after(Duration::from_secs(1));
        assert!(soon > Instant::now());
        let never = deadline_after(Duration::MAX);
        assert!(never >= Instant::now() + Duration::from_secs(86_400 * 365));
    }

    #[test]
    fn zero_idle_shutdown_disables_interval() {
        let cfg = RoomConfig::new(512, Duration::ZERO);
        assert_eq!(cfg.idle_interval(), None);

        let cfg = RoomConfig::new(512, Duration::from_secs(5));
        assert_eq!(cfg.idle_interval(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn with_limits_keeps_timings() {
        let template = RoomConfig::default()
            .with_write_wait(Duration::from_secs(1))
            .with_outbound_capacity(4);
        let cfg = template.with_limits(1024, Duration::from_secs(7));
        assert_eq!(cfg.max_message_size, 1024);
        assert_eq!(cfg.idle_shutdown, Duration::from_secs(7));
        assert_eq!(cfg.write_wait, Duration::from_secs(1));
        assert_eq!(cfg.outbound_capacity, 4);
    }

    #[test]
    fn capacities_are_clamped() {
        let cfg = RoomConfig::default()
            .with_outbound_capacity(0)
            .with_broadcast_capacity(0);
        assert_eq!(cfg.outbound_capacity, 1);
        assert_eq!(cfg.broadcast_capacity, 1);
    }
}
