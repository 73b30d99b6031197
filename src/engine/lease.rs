//! The lease record: ownership and progress for one source partition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ContinuationToken;

/// Ownership and progress record for one source partition.
///
/// At most one owner is valid at any instant per partition, enforced by the
/// lease store's compare-and-swap on [`version`](Lease::version) rather than
/// by locking. A lease whose [`expires_at`](Lease::expires_at) has passed is
/// eligible for takeover by any instance.
///
/// Lifecycle: created unowned when a partition is first discovered; mutated
/// on acquire (owner set, window refreshed), renew (window refreshed),
/// checkpoint (token advanced), and release (owner cleared); never deleted
/// while the source partition exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// Stable identifier of the source partition.
    pub partition_id: String,

    /// Instance currently holding the lease, `None` if unowned.
    pub owner: Option<String>,

    /// Cursor after the last successfully processed batch.
    ///
    /// `None` means "start from the configured start time".
    pub continuation_token: Option<ContinuationToken>,

    /// When the lease was last written by its owner.
    pub lease_timestamp: DateTime<Utc>,

    /// When the lease stops defending its owner.
    pub expires_at: DateTime<Utc>,

    /// Concurrency token for optimistic updates. Bumped by the store on
    /// every successful write; `0` means "not yet persisted".
    pub version: u64,
}

impl Lease {
    /// A freshly discovered, unowned lease.
    ///
    /// Created already expired so that any instance may acquire it.
    pub fn unowned(partition_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            partition_id: partition_id.into(),
            owner: None,
            continuation_token: None,
            lease_timestamp: now,
            expires_at: now,
            version: 0,
        }
    }

    /// True once the TTL has elapsed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True when any instance may acquire this lease: unowned, or expired.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.owner.is_none() || self.is_expired_at(now)
    }

    /// True when `host` holds this lease.
    pub fn owned_by(&self, host: &str) -> bool {
        self.owner.as_deref() == Some(host)
    }
}
