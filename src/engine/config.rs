//! Engine configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::error::{EngineError, EngineResult};
use crate::constants::{
    DEFAULT_LEASE_TTL_SECS, DEFAULT_MAX_BATCH_RECORDS, DEFAULT_MAX_POLL_RETRIES,
    DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_POLL_DELAY_MS, DEFAULT_REBALANCE_INTERVAL_SECS,
};

/// What to do when the handler rejects a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HandlerErrorPolicy {
    /// Stop the partition's loop and release its lease (default).
    ///
    /// The batch is redelivered when the partition is next acquired, here
    /// or on another instance.
    #[default]
    Abort,

    /// Log, advance the checkpoint past the batch, and continue.
    ///
    /// At-least-once degrades to "at least once, with possible gaps": the
    /// skipped batch is never redelivered.
    Skip,
}

impl std::str::FromStr for HandlerErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(HandlerErrorPolicy::Abort),
            "skip" => Ok(HandlerErrorPolicy::Skip),
            _ => Err(format!(
                "unknown handler error policy '{}'. Valid policies: abort, skip",
                s
            )),
        }
    }
}

impl std::fmt::Display for HandlerErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerErrorPolicy::Abort => write!(f, "abort"),
            HandlerErrorPolicy::Skip => write!(f, "skip"),
        }
    }
}

/// Configuration for a [`ChangeFeedProcessor`](super::ChangeFeedProcessor)
/// instance.
///
/// # Interval Relationships
///
/// The renewal interval must be strictly shorter than the lease TTL so that
/// jitter does not cause false expiry; [`validate`](ProcessorConfig::validate)
/// enforces this. Setting the TTL via
/// [`with_lease_ttl`](ProcessorConfig::with_lease_ttl) re-derives the renewal
/// interval as TTL/3 unless one was set explicitly afterwards.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// This instance's identity; becomes the `owner` value on leases it
    /// acquires. Must be unique across the fleet sharing a lease store.
    pub host_name: String,

    /// Delay between polls when a partition has no new changes.
    pub poll_delay: Duration,

    /// How long an unrenewed lease defends its owner.
    pub lease_ttl: Duration,

    /// How often owned leases are renewed.
    pub renew_interval: Duration,

    /// How often the load balancer re-evaluates ownership.
    pub rebalance_interval: Duration,

    /// Bounded timeout for a single store call or source poll.
    pub operation_timeout: Duration,

    /// Maximum records requested per poll.
    pub max_batch_records: usize,

    /// Consecutive failed polls before a partition is declared degraded.
    pub max_poll_retries: usize,

    /// Initial cursor for partitions with no checkpoint yet.
    pub start_time: DateTime<Utc>,

    /// Bounded-run stop boundary.
    ///
    /// When set, changes with timestamps past this instant are never
    /// delivered; observing one stops the entire engine.
    pub end_time: Option<DateTime<Utc>>,

    /// What to do when the handler rejects a batch.
    pub on_handler_error: HandlerErrorPolicy,
}

impl ProcessorConfig {
    /// Defaults for the given instance identity.
    pub fn new(host_name: impl Into<String>) -> Self {
        let lease_ttl = Duration::from_secs(DEFAULT_LEASE_TTL_SECS);
        Self {
            host_name: host_name.into(),
            poll_delay: Duration::from_millis(DEFAULT_POLL_DELAY_MS),
            lease_ttl,
            renew_interval: lease_ttl / 3,
            rebalance_interval: Duration::from_secs(DEFAULT_REBALANCE_INTERVAL_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            max_batch_records: DEFAULT_MAX_BATCH_RECORDS,
            max_poll_retries: DEFAULT_MAX_POLL_RETRIES,
            start_time: DateTime::UNIX_EPOCH,
            end_time: None,
            on_handler_error: HandlerErrorPolicy::default(),
        }
    }

    /// Read configuration from environment variables.
    ///
    /// - `FEEDLOCK_HOST_NAME`: instance identity (required)
    /// - `FEEDLOCK_POLL_DELAY_MS`: poll delay in milliseconds
    /// - `FEEDLOCK_LEASE_TTL_SECS`: lease TTL in seconds
    /// - `FEEDLOCK_HANDLER_ERROR_POLICY`: `abort` or `skip`
    pub fn from_env() -> EngineResult<Self> {
        let host_name = std::env::var("FEEDLOCK_HOST_NAME")
            .map_err(|_| EngineError::Config("FEEDLOCK_HOST_NAME is not set".to_string()))?;

        let mut config = Self::new(host_name);

        if let Some(ms) = read_env_u64("FEEDLOCK_POLL_DELAY_MS")? {
            config.poll_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = read_env_u64("FEEDLOCK_LEASE_TTL_SECS")? {
            config = config.with_lease_ttl(Duration::from_secs(secs));
        }
        if let Ok(policy) = std::env::var("FEEDLOCK_HANDLER_ERROR_POLICY") {
            config.on_handler_error = policy.parse().map_err(EngineError::Config)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the poll delay.
    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = delay;
        self
    }

    /// Set the lease TTL, re-deriving the renewal interval as TTL/3.
    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self.renew_interval = ttl / 3;
        self
    }

    /// Set the renewal interval explicitly.
    pub fn with_renew_interval(mut self, interval: Duration) -> Self {
        self.renew_interval = interval;
        self
    }

    /// Set the rebalance interval.
    pub fn with_rebalance_interval(mut self, interval: Duration) -> Self {
        self.rebalance_interval = interval;
        self
    }

    /// Set the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the initial cursor for partitions with no checkpoint.
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = start;
        self
    }

    /// Bound the run: deliver changes in `[start, end]`, then stop the
    /// engine.
    pub fn with_run_window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_time = start;
        self.end_time = Some(end);
        self
    }

    /// Set the handler error policy.
    pub fn with_handler_error_policy(mut self, policy: HandlerErrorPolicy) -> Self {
        self.on_handler_error = policy;
        self
    }

    /// Set the maximum records per poll.
    pub fn with_max_batch_records(mut self, max: usize) -> Self {
        self.max_batch_records = max;
        self
    }

    /// Check interval relationships and required fields.
    pub fn validate(&self) -> EngineResult<()> {
        if self.host_name.trim().is_empty() {
            return Err(EngineError::Config("host_name must not be empty".to_string()));
        }
        if self.lease_ttl.is_zero() {
            return Err(EngineError::Config("lease_ttl must be non-zero".to_string()));
        }
        if self.renew_interval >= self.lease_ttl {
            return Err(EngineError::Config(format!(
                "renew_interval ({:?}) must be shorter than lease_ttl ({:?})",
                self.renew_interval, self.lease_ttl
            )));
        }
        if self.max_batch_records == 0 {
            return Err(EngineError::Config(
                "max_batch_records must be non-zero".to_string(),
            ));
        }
        if let Some(end) = self.end_time {
            if end <= self.start_time {
                return Err(EngineError::Config(format!(
                    "end_time ({}) must be after start_time ({})",
                    end, self.start_time
                )));
            }
        }
        Ok(())
    }
}

fn read_env_u64(name: &str) -> EngineResult<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| EngineError::Config(format!("{} must be an integer, got '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProcessorConfig::new("host-a");
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_delay, Duration::from_millis(100));
        assert_eq!(config.renew_interval, config.lease_ttl / 3);
        assert_eq!(config.on_handler_error, HandlerErrorPolicy::Abort);
        assert!(config.end_time.is_none());
    }

    #[test]
    fn test_lease_ttl_rederives_renew_interval() {
        let config = ProcessorConfig::new("host-a").with_lease_ttl(Duration::from_secs(30));
        assert_eq!(config.renew_interval, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_host_name_rejected() {
        let config = ProcessorConfig::new("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_renew_interval_must_be_shorter_than_ttl() {
        let config = ProcessorConfig::new("host-a")
            .with_lease_ttl(Duration::from_secs(10))
            .with_renew_interval(Duration::from_secs(10));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_run_window_rejected() {
        let start = Utc.with_ymd_and_hms(2022, 2, 24, 19, 30, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 2, 24, 19, 0, 0).unwrap();
        let config = ProcessorConfig::new("host-a").with_run_window(start, end);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_run_window_accepted() {
        let start = Utc.with_ymd_and_hms(2022, 2, 24, 19, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2022, 2, 24, 19, 30, 0).unwrap();
        let config = ProcessorConfig::new("host-a").with_run_window(start, end);
        assert!(config.validate().is_ok());
        assert_eq!(config.start_time, start);
        assert_eq!(config.end_time, Some(end));
    }

    #[test]
    fn test_handler_error_policy_parse() {
        assert_eq!(
            "abort".parse::<HandlerErrorPolicy>().unwrap(),
            HandlerErrorPolicy::Abort
        );
        assert_eq!(
            "SKIP".parse::<HandlerErrorPolicy>().unwrap(),
            HandlerErrorPolicy::Skip
        );
        assert!("retry".parse::<HandlerErrorPolicy>().is_err());
    }

    #[test]
    fn test_handler_error_policy_display() {
        assert_eq!(HandlerErrorPolicy::Abort.to_string(), "abort");
        assert_eq!(HandlerErrorPolicy::Skip.to_string(), "skip");
    }
}
