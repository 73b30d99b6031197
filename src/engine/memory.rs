//! In-memory adapters for tests and demos.
//!
//! [`InMemoryLeaseStore`] and [`InMemoryChangeSource`] implement the
//! collaborator contracts entirely in process, with the same
//! optimistic-concurrency semantics a document-store-backed adapter would
//! have. They also expose fault-injection helpers (`set_unavailable`,
//! `set_latency`, `fail_partition`, `expire_all`) so coordination properties
//! can be exercised without a real backing store.
//!
//! The continuation token format is the record index encoded as a decimal
//! string; like any token it is opaque to the engine and only interpreted
//! here.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::error::{EngineError, EngineResult};
use super::lease::Lease;
use super::traits::{ChangeSource, LeaseStore};
use crate::types::{ChangeBatch, ChangeRecord, ContinuationToken};

/// In-memory lease store with compare-and-swap writes.
#[derive(Default)]
pub struct InMemoryLeaseStore {
    leases: RwLock<BTreeMap<String, Lease>>,
    unavailable: AtomicBool,
    latency: RwLock<Option<Duration>>,
}

impl InMemoryLeaseStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store being unreachable: every call fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency` (for timeout testing).
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    /// Force-expire every lease (for takeover scenarios).
    pub async fn expire_all(&self) {
        let past = Utc::now() - chrono::Duration::seconds(1);
        let mut leases = self.leases.write().await;
        for lease in leases.values_mut() {
            lease.expires_at = past;
        }
    }

    /// Fetch a lease without going through the trait.
    pub async fn get_lease(&self, partition_id: &str) -> Option<Lease> {
        self.leases.read().await.get(partition_id).cloned()
    }

    /// Number of stored leases.
    pub async fn lease_count(&self) -> usize {
        self.leases.read().await.len()
    }

    async fn check_faults(&self) -> EngineResult<()> {
        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn list(&self) -> EngineResult<Vec<Lease>> {
        self.check_faults().await?;
        Ok(self.leases.read().await.values().cloned().collect())
    }

    async fn try_write(&self, lease: Lease, expected_version: Option<u64>) -> EngineResult<Lease> {
        self.check_faults().await?;

        let mut leases = self.leases.write().await;
        let stored_version = leases.get(&lease.partition_id).map(|l| l.version);

        let next_version = match (stored_version, expected_version) {
            (None, None) => 1,
            (Some(stored), Some(expected)) if stored == expected => stored + 1,
            _ => {
                return Err(EngineError::Conflict {
                    partition_id: lease.partition_id,
                });
            }
        };

        let mut stored = lease;
        stored.version = next_version;
        leases.insert(stored.partition_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn get(&self, partition_id: &str) -> EngineResult<Option<Lease>> {
        self.check_faults().await?;
        Ok(self.leases.read().await.get(partition_id).cloned())
    }
}

/// In-memory change source: per-partition record logs ordered by timestamp.
#[derive(Default)]
pub struct InMemoryChangeSource {
    partitions: RwLock<BTreeMap<String, Vec<ChangeRecord>>>,
    unavailable: AtomicBool,
    failing_partitions: RwLock<HashSet<String>>,
}

impl InMemoryChangeSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partition, empty until records are pushed.
    pub async fn add_partition(&self, partition_id: impl Into<String>) {
        self.partitions
            .write()
            .await
            .entry(partition_id.into())
            .or_default();
    }

    /// Append a change record to a partition's log.
    ///
    /// Records are kept ordered by timestamp; pushing out of order inserts
    /// at the right position.
    pub async fn push(&self, partition_id: &str, record: ChangeRecord) {
        let mut partitions = self.partitions.write().await;
        let log = partitions.entry(partition_id.to_string()).or_default();
        let at = log.partition_point(|r| r.ts <= record.ts);
        log.insert(at, record);
    }

    /// Append a record built from an id, timestamp and JSON body.
    pub async fn push_json(
        &self,
        partition_id: &str,
        id: &str,
        ts: DateTime<Utc>,
        body: serde_json::Value,
    ) {
        self.push(partition_id, ChangeRecord::new(id, ts, body)).await;
    }

    /// Simulate the source being unreachable: every call fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make calls for one partition fail while the rest keep working.
    pub async fn fail_partition(&self, partition_id: &str) {
        self.failing_partitions
            .write()
            .await
            .insert(partition_id.to_string());
    }

    /// Undo [`fail_partition`](InMemoryChangeSource::fail_partition).
    pub async fn heal_partition(&self, partition_id: &str) {
        self.failing_partitions.write().await.remove(partition_id);
    }

    async fn check_faults(&self, partition_id: Option<&str>) -> EngineResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EngineError::SourceUnavailable(
                "in-memory source marked unavailable".to_string(),
            ));
        }
        if let Some(partition_id) = partition_id {
            if self.failing_partitions.read().await.contains(partition_id) {
                return Err(EngineError::SourceUnavailable(format!(
                    "partition {} marked failing",
                    partition_id
                )));
            }
        }
        Ok(())
    }

    fn start_index(
        log: &[ChangeRecord],
        token: Option<&ContinuationToken>,
        start_time: DateTime<Utc>,
    ) -> EngineResult<usize> {
        match token {
            Some(token) => token.as_str().parse::<usize>().map_err(|_| {
                EngineError::SourceUnavailable(format!(
                    "malformed continuation token '{}'",
                    token
                ))
            }),
            None => Ok(log.partition_point(|r| r.ts < start_time)),
        }
    }
}

#[async_trait]
impl ChangeSource for InMemoryChangeSource {
    async fn partitions(&self) -> EngineResult<Vec<String>> {
        self.check_faults(None).await?;
        Ok(self.partitions.read().await.keys().cloned().collect())
    }

    async fn poll(
        &self,
        partition_id: &str,
        token: Option<&ContinuationToken>,
        start_time: DateTime<Utc>,
        max_records: usize,
    ) -> EngineResult<ChangeBatch> {
        self.check_faults(Some(partition_id)).await?;

        let partitions = self.partitions.read().await;
        let log = partitions.get(partition_id).map(Vec::as_slice).unwrap_or(&[]);

        let start = Self::start_index(log, token, start_time)?.min(log.len());
        let end = (start + max_records).min(log.len());
        let records = log[start..end].to_vec();

        Ok(ChangeBatch {
            partition_id: partition_id.to_string(),
            records,
            next_token: ContinuationToken::new(end.to_string()),
        })
    }

    async fn estimate_pending(
        &self,
        partition_id: &str,
        token: Option<&ContinuationToken>,
    ) -> EngineResult<u64> {
        self.check_faults(Some(partition_id)).await?;

        let partitions = self.partitions.read().await;
        let log = partitions.get(partition_id).map(Vec::as_slice).unwrap_or(&[]);

        let start = Self::start_index(log, token, DateTime::UNIX_EPOCH)?.min(log.len());
        Ok((log.len() - start) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    // ========================================================================
    // Lease store
    // ========================================================================

    #[tokio::test]
    async fn test_create_then_cas_update() {
        let store = InMemoryLeaseStore::new();

        let created = store.try_write(Lease::unowned("p0"), None).await.unwrap();
        assert_eq!(created.version, 1);

        let mut next = created.clone();
        next.owner = Some("host-a".to_string());
        let updated = store.try_write(next, Some(1)).await.unwrap();
        assert_eq!(updated.version, 2);
        assert!(updated.owned_by("host-a"));
    }

    #[tokio::test]
    async fn test_create_existing_conflicts() {
        let store = InMemoryLeaseStore::new();
        store.try_write(Lease::unowned("p0"), None).await.unwrap();

        let result = store.try_write(Lease::unowned("p0"), None).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = InMemoryLeaseStore::new();
        let created = store.try_write(Lease::unowned("p0"), None).await.unwrap();

        let mut first = created.clone();
        first.owner = Some("host-a".to_string());
        store.try_write(first, Some(1)).await.unwrap();

        // Second writer still holds version 1.
        let mut second = created.clone();
        second.owner = Some("host-b".to_string());
        let result = store.try_write(second, Some(1)).await;
        assert!(matches!(result, Err(EngineError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_all_calls() {
        let store = InMemoryLeaseStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.list().await,
            Err(EngineError::StoreUnavailable(_))
        ));
        assert!(matches!(
            store.try_write(Lease::unowned("p0"), None).await,
            Err(EngineError::StoreUnavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.list().await.is_ok());
    }

    // ========================================================================
    // Change source
    // ========================================================================

    async fn seeded_source() -> InMemoryChangeSource {
        let source = InMemoryChangeSource::new();
        for i in 0..5 {
            source
                .push_json("p0", &format!("doc-{}", i), ts(100 + i), serde_json::json!({ "i": i }))
                .await;
        }
        source
    }

    #[tokio::test]
    async fn test_poll_from_start_time() {
        let source = seeded_source().await;

        let batch = source.poll("p0", None, ts(102), 10).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.records[0].ts, ts(102));
        assert_eq!(batch.next_token, ContinuationToken::new("5"));
    }

    #[tokio::test]
    async fn test_poll_respects_max_records() {
        let source = seeded_source().await;

        let batch = source.poll("p0", None, ts(0), 2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.next_token, ContinuationToken::new("2"));

        let next = source
            .poll("p0", Some(&batch.next_token), ts(0), 2)
            .await
            .unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next.records[0].ts, ts(102));
    }

    #[tokio::test]
    async fn test_poll_at_head_is_empty() {
        let source = seeded_source().await;
        let token = ContinuationToken::new("5");

        let batch = source.poll("p0", Some(&token), ts(0), 10).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.next_token, token);
    }

    #[tokio::test]
    async fn test_records_ordered_by_ts_even_when_pushed_out_of_order() {
        let source = InMemoryChangeSource::new();
        source
            .push_json("p0", "late", ts(200), serde_json::json!({}))
            .await;
        source
            .push_json("p0", "early", ts(100), serde_json::json!({}))
            .await;

        let batch = source.poll("p0", None, ts(0), 10).await.unwrap();
        assert_eq!(batch.records[0].id, "early");
        assert_eq!(batch.records[1].id, "late");
    }

    #[tokio::test]
    async fn test_estimate_pending() {
        let source = seeded_source().await;

        assert_eq!(source.estimate_pending("p0", None).await.unwrap(), 5);
        assert_eq!(
            source
                .estimate_pending("p0", Some(&ContinuationToken::new("3")))
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            source
                .estimate_pending("p0", Some(&ContinuationToken::new("5")))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_failing_partition_isolated() {
        let source = seeded_source().await;
        source.add_partition("p1").await;
        source.fail_partition("p0").await;

        assert!(source.poll("p0", None, ts(0), 10).await.is_err());
        assert!(source.poll("p1", None, ts(0), 10).await.is_ok());

        source.heal_partition("p0").await;
        assert!(source.poll("p0", None, ts(0), 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_partitions_lists_known_ids() {
        let source = seeded_source().await;
        source.add_partition("p1").await;

        let ids = source.partitions().await.unwrap();
        assert_eq!(ids, vec!["p0".to_string(), "p1".to_string()]);
    }
}
