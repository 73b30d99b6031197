//! Lease lifecycle: acquisition, renewal, checkpointing, release.
//!
//! Every mutation goes through the lease store's compare-and-swap, so the
//! single-owner invariant holds across a fleet of independent processes
//! without any in-process locking. Lost races come back as
//! [`Conflict`](EngineError::Conflict) on acquisition and
//! [`LeaseLost`](EngineError::LeaseLost) on renewal/checkpoint, and callers
//! react locally: pick a different partition, or stop the partition loop.
//!
//! All store calls are bounded by the configured operation timeout; a timed
//! out call is treated identically to a failed one (a renewal that may or
//! may not have landed must be assumed lost once the TTL elapses).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::error::{EngineError, EngineResult};
use super::lease::Lease;
use super::metrics;
use super::traits::LeaseStore;
use crate::types::ContinuationToken;

/// Owns the lifecycle of this instance's leases.
pub struct LeaseManager {
    store: Arc<dyn LeaseStore>,
    host_name: String,
    lease_ttl: Duration,
    operation_timeout: StdDuration,
}

impl LeaseManager {
    /// Create a manager writing leases as `host_name`.
    pub fn new(
        store: Arc<dyn LeaseStore>,
        host_name: impl Into<String>,
        lease_ttl: StdDuration,
        operation_timeout: StdDuration,
    ) -> EngineResult<Self> {
        let lease_ttl = Duration::from_std(lease_ttl)
            .map_err(|e| EngineError::Config(format!("lease_ttl out of range: {}", e)))?;
        Ok(Self {
            store,
            host_name: host_name.into(),
            lease_ttl,
            operation_timeout,
        })
    }

    /// The owner identity this manager writes.
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    /// All lease records, bounded by the operation timeout.
    pub async fn list(&self) -> EngineResult<Vec<Lease>> {
        self.bounded("lease list", self.store.list()).await
    }

    /// Take ownership of an unowned or expired lease.
    ///
    /// Fails with [`Conflict`](EngineError::Conflict) if the lease is still
    /// defended by another owner or if a concurrent writer won the race.
    /// Callers must move on to a different partition rather than looping on
    /// the same one.
    pub async fn acquire(&self, current: &Lease) -> EngineResult<Lease> {
        let now = Utc::now();
        if !current.is_available_at(now) {
            metrics::LEASE_CONFLICTS.inc();
            return Err(EngineError::Conflict {
                partition_id: current.partition_id.clone(),
            });
        }

        let mut next = current.clone();
        next.owner = Some(self.host_name.clone());
        next.lease_timestamp = now;
        next.expires_at = now + self.lease_ttl;

        match self
            .bounded(
                "lease acquire",
                self.store.try_write(next, Some(current.version)),
            )
            .await
        {
            Ok(acquired) => {
                metrics::LEASES_ACQUIRED.inc();
                info!(
                    partition_id = %acquired.partition_id,
                    owner = %self.host_name,
                    expires_at = %acquired.expires_at,
                    "Acquired lease"
                );
                Ok(acquired)
            }
            Err(e) => {
                if matches!(e, EngineError::Conflict { .. }) {
                    metrics::LEASE_CONFLICTS.inc();
                    debug!(
                        partition_id = %current.partition_id,
                        "Lost lease acquisition race"
                    );
                }
                Err(e)
            }
        }
    }

    /// Extend the expiry of a lease we hold.
    ///
    /// Fails with [`LeaseLost`](EngineError::LeaseLost) if another instance
    /// stole the lease; the caller must stop processing that partition
    /// immediately.
    pub async fn renew(&self, current: &Lease) -> EngineResult<Lease> {
        if !current.owned_by(&self.host_name) {
            metrics::LEASES_LOST.inc();
            return Err(EngineError::LeaseLost {
                partition_id: current.partition_id.clone(),
            });
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.lease_timestamp = now;
        next.expires_at = now + self.lease_ttl;

        match self
            .bounded(
                "lease renew",
                self.store.try_write(next, Some(current.version)),
            )
            .await
        {
            Ok(renewed) => {
                metrics::LEASES_RENEWED.inc();
                debug!(
                    partition_id = %renewed.partition_id,
                    expires_at = %renewed.expires_at,
                    "Renewed lease"
                );
                Ok(renewed)
            }
            Err(EngineError::Conflict { partition_id }) => {
                metrics::LEASES_LOST.inc();
                Err(EngineError::LeaseLost { partition_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a new continuation token for a lease we hold.
    ///
    /// Only called after the handler has successfully processed the batch
    /// the token covers; the token therefore never moves backwards. The
    /// write also refreshes the lease window, since a successful checkpoint
    /// proves the owner is alive. [`LeaseLost`](EngineError::LeaseLost)
    /// semantics match [`renew`](LeaseManager::renew).
    pub async fn checkpoint(
        &self,
        current: &Lease,
        token: ContinuationToken,
    ) -> EngineResult<Lease> {
        if !current.owned_by(&self.host_name) {
            metrics::LEASES_LOST.inc();
            return Err(EngineError::LeaseLost {
                partition_id: current.partition_id.clone(),
            });
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.continuation_token = Some(token);
        next.lease_timestamp = now;
        next.expires_at = now + self.lease_ttl;

        match self
            .bounded(
                "lease checkpoint",
                self.store.try_write(next, Some(current.version)),
            )
            .await
        {
            Ok(checkpointed) => {
                metrics::CHECKPOINTS.inc();
                debug!(
                    partition_id = %checkpointed.partition_id,
                    token = ?checkpointed.continuation_token,
                    "Checkpointed"
                );
                Ok(checkpointed)
            }
            Err(EngineError::Conflict { partition_id }) => {
                metrics::LEASES_LOST.inc();
                Err(EngineError::LeaseLost { partition_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Clear ownership of a lease, best-effort.
    ///
    /// Releasing a lease we no longer hold is a no-op. A failed release is
    /// logged, never fatal: the lease simply expires and is reclaimed.
    pub async fn release(&self, current: &Lease) {
        if !current.owned_by(&self.host_name) {
            debug!(
                partition_id = %current.partition_id,
                "Skipping release of lease we do not hold"
            );
            return;
        }

        let now = Utc::now();
        let mut next = current.clone();
        next.owner = None;
        next.lease_timestamp = now;
        next.expires_at = now;

        match self
            .bounded(
                "lease release",
                self.store.try_write(next, Some(current.version)),
            )
            .await
        {
            Ok(_) => {
                metrics::LEASES_RELEASED.inc();
                info!(partition_id = %current.partition_id, "Released lease");
            }
            Err(e) => {
                warn!(
                    partition_id = %current.partition_id,
                    error = %e,
                    "Lease release failed; lease will expire on its own"
                );
            }
        }
    }

    /// Make sure a lease record exists for a newly discovered partition.
    ///
    /// Races with other instances discovering the same partition are
    /// resolved by re-reading whoever's create landed first.
    pub async fn ensure_lease(&self, partition_id: &str) -> EngineResult<Lease> {
        if let Some(existing) = self
            .bounded("lease get", self.store.get(partition_id))
            .await?
        {
            return Ok(existing);
        }

        match self
            .bounded(
                "lease create",
                self.store.try_write(Lease::unowned(partition_id), None),
            )
            .await
        {
            Ok(created) => {
                info!(partition_id, "Created lease for discovered partition");
                Ok(created)
            }
            Err(EngineError::Conflict { .. }) => self
                .bounded("lease get", self.store.get(partition_id))
                .await?
                .ok_or_else(|| {
                    EngineError::StoreUnavailable(format!(
                        "lease for partition {} vanished after create race",
                        partition_id
                    ))
                }),
            Err(e) => Err(e),
        }
    }

    /// Run a store call with the configured timeout.
    async fn bounded<T, F>(&self, what: &str, fut: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::StoreUnavailable(format!(
                "{} timed out after {:?}",
                what, self.operation_timeout
            ))),
        }
    }
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("host_name", &self.host_name)
            .field("lease_ttl", &self.lease_ttl)
            .field("operation_timeout", &self.operation_timeout)
            .finish()
    }
}
