//! Named retry policies for consistent backoff behavior.
//!
//! All policies include jitter to prevent a fleet of instances from
//! retrying in lockstep against the same store.
//!
//! | Policy | Min Delay | Max Delay | Retries | Use Case |
//! |--------|-----------|-----------|---------|----------|
//! | `store_policy` | 50ms | 5s | 5 | Lease store writes |
//! | `source_policy` | 100ms | 2s | 5 | Change source polls |
//! | `fast_policy` | 5ms | 100ms | 3 | Hot path retries |
//!
//! # Example
//!
//! ```rust,no_run
//! use backon::Retryable;
//! use feedlock::engine::retry;
//!
//! async fn example() -> Result<(), std::io::Error> {
//!     let result = (|| async {
//!         // your fallible operation
//!         Ok::<_, std::io::Error>(())
//!     })
//!     .retry(retry::store_policy())
//!     .when(|e| e.kind() == std::io::ErrorKind::TimedOut)
//!     .await?;
//!
//!     Ok(result)
//! }
//! ```

use std::time::Duration;

use backon::ExponentialBuilder;

/// Policy for lease store operations (acquire, renew, checkpoint).
///
/// Moderate initial delay to avoid hammering a recovering store, long max
/// delay for failover scenarios.
pub fn store_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(5)
        .with_jitter()
}

/// Policy for change source polls.
///
/// Shorter max delay than the store policy: a stalled poll holds up exactly
/// one partition, and the worker declares the partition degraded once the
/// retries are spent.
pub fn source_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(5)
        .with_jitter()
}

/// Policy for hot path retries (minimal delay, few attempts).
pub fn fast_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(100))
        .with_max_times(3)
        .with_jitter()
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::Retryable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_eventually_succeeds() {
        let attempts = AtomicUsize::new(0);

        let result = (|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"))
            } else {
                Ok(42)
            }
        })
        .retry(fast_policy())
        .when(|e| e.kind() == std::io::ErrorKind::TimedOut)
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_times() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), _> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"))
        })
        .retry(fast_policy())
        .when(|e| e.kind() == std::io::ErrorKind::TimedOut)
        .await;

        assert!(result.is_err());
        // Initial attempt plus three retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_non_matching_error_not_retried() {
        let attempts = AtomicUsize::new(0);

        let result: Result<(), _> = (|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        })
        .retry(fast_policy())
        .when(|e| e.kind() == std::io::ErrorKind::TimedOut)
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
