//! Counters describing the gateway's check-in history.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Check-ins that completed successfully.
    pub checkins_succeeded: u64,
    /// Check-ins that returned an error.
    pub checkins_failed: u64,
    /// Failed check-ins since the last successful one.
    pub consecutive_failures: u64,
    /// Dispatch calls that returned an error.
    pub dispatch_failures: u64,
    /// Events removed from the reporter after a successful check-in.
    pub events_acknowledged: u64,
    /// When the last successful check-in completed.
    pub last_checkin: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(super) struct GatewayMetrics {
    checkins_succeeded: AtomicU64,
    checkins_failed: AtomicU64,
    consecutive_failures: AtomicU64,
    dispatch_failures: AtomicU64,
    events_acknowledged: AtomicU64,
    last_checkin: RwLock<Option<DateTime<Utc>>>,
}

impl GatewayMetrics {
    pub(super) fn record_checkin_success(&self, events: usize) {
        self.checkins_succeeded.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.events_acknowledged
            .fetch_add(events as u64, Ordering::Relaxed);
        *self.last_checkin.write() = Some(Utc::now());
    }

    /// Returns the number of consecutive failures including this one.
    pub(super) fn record_checkin_failure(&self) -> u64 {
        self.checkins_failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(super) fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> GatewayStats {
        GatewayStats {
            checkins_succeeded: self.checkins_succeeded.load(Ordering::Relaxed),
            checkins_failed: self.checkins_failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            events_acknowledged: self.events_acknowledged.load(Ordering::Relaxed),
            last_checkin: *self.last_checkin.read(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_reset_on_success() {
        let metrics = GatewayMetrics::default();

        assert_eq!(metrics.record_checkin_failure(), 1);
        assert_eq!(metrics.record_checkin_failure(), 2);
        metrics.record_checkin_success(3);

        let stats = metrics.snapshot();
        assert_eq!(stats.checkins_failed, 2);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.checkins_succeeded, 1);
        assert_eq!(stats.events_acknowledged, 3);
        assert!(stats.last_checkin.is_some());
    }

    #[test]
    fn test_dispatch_failures_counted() {
        let metrics = GatewayMetrics::default();
        metrics.record_dispatch_failure();
        assert_eq!(metrics.snapshot().dispatch_failures, 1);
        assert_eq!(metrics.snapshot().last_checkin, None);
    }
}
