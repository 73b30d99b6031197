//! Default tuning values for the engine.
//!
//! All defaults live here so that the relationship between intervals is
//! visible in one place. The most important relationship: the renewal
//! interval must be strictly shorter than the lease TTL (we use TTL/3) so
//! that clock or network jitter does not cause a healthy owner to lose its
//! lease.

/// Delay between polls when a partition has no new changes (milliseconds).
pub const DEFAULT_POLL_DELAY_MS: u64 = 100;

/// How long a lease remains valid without renewal (seconds).
pub const DEFAULT_LEASE_TTL_SECS: u64 = 60;

/// How often an owner renews its leases (seconds). TTL/3.
pub const DEFAULT_RENEW_INTERVAL_SECS: u64 = 20;

/// How often the load balancer re-evaluates lease ownership (seconds).
///
/// A prime-ish value so that two instances started at the same moment drift
/// apart instead of colliding on every cycle.
pub const DEFAULT_REBALANCE_INTERVAL_SECS: u64 = 13;

/// Bounded timeout for a single lease store or change source call (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;

/// Maximum records returned by a single poll.
pub const DEFAULT_MAX_BATCH_RECORDS: usize = 100;

/// Consecutive failed polls before a partition is declared degraded.
pub const DEFAULT_MAX_POLL_RETRIES: usize = 5;

/// How long `stop()` waits for workers to drain before aborting them (seconds).
///
/// Must be generous: a worker blocked in a handler invocation is allowed to
/// finish that invocation before it observes the shutdown signal.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_interval_shorter_than_ttl() {
        // Renewal must fire several times within one TTL window.
        assert!(DEFAULT_RENEW_INTERVAL_SECS * 3 <= DEFAULT_LEASE_TTL_SECS);
    }

    #[test]
    fn test_poll_delay_is_subsecond() {
        assert!(DEFAULT_POLL_DELAY_MS < 1000);
    }
}
