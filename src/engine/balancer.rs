//! Lease load balancing across processor instances.
//!
//! The balancer is a pure planner: given a snapshot of all lease records it
//! classifies them, estimates the active fleet size, and proposes
//! acquisitions and releases. The processor's rebalance loop executes the
//! plan against the lease store; the compare-and-swap there is what makes
//! concurrent plans safe, so the planner itself needs no locking and is
//! synchronously testable.
//!
//! # Policy
//!
//! An instance targets `ceil(total / active_instances)` leases, where the
//! active instance count is the number of distinct live owners observed
//! across all leases (self included). Below target it proposes available
//! (unowned or expired) leases, in partition order; it never proposes taking
//! a lease still inside its TTL. Above target it proposes shedding the
//! surplus, which the owner releases gracefully so under-provisioned peers
//! can pick the leases up on their next cycle.
//!
//! Ownership expands one lease per cycle: during a cold-start scramble every
//! instance appears in the owner census after a single cycle, and the fleet
//! converges to a floor/ceil split instead of the fastest instance hoarding
//! the whole feed. Rebalancing is advisory and eventual; transient imbalance
//! between cycles is expected. Stale owners disappear from the census as
//! their leases expire and are reclaimed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::lease::Lease;

/// Decides which leases this instance should try to acquire or shed.
#[derive(Debug, Clone)]
pub struct LeaseBalancer {
    host_name: String,
}

/// One rebalance cycle's view and proposals.
#[derive(Debug, Clone)]
pub struct BalancePlan {
    /// Total partitions known to the lease store.
    pub total_partitions: usize,

    /// Distinct live owners observed, self included.
    pub active_instances: usize,

    /// Target lease count for this instance.
    pub desired_count: usize,

    /// Leases this instance currently holds (live, not expired).
    pub owned: Vec<Lease>,

    /// Acquisition candidates, at most the current deficit, in partition
    /// order. The executor tries them in order and stops after the first
    /// success; conflicts mean a peer got there first and are skipped.
    pub to_acquire: Vec<Lease>,

    /// Partitions to shed because this instance is over target.
    pub to_release: Vec<String>,
}

impl BalancePlan {
    /// True when the plan proposes no changes.
    pub fn is_settled(&self) -> bool {
        self.to_acquire.is_empty() && self.to_release.is_empty()
    }
}

impl LeaseBalancer {
    /// Create a balancer planning for `host_name`.
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    /// Plan one rebalance cycle from a snapshot of all leases.
    pub fn plan(&self, leases: &[Lease], now: DateTime<Utc>) -> BalancePlan {
        let mut available: Vec<Lease> = Vec::new();
        let mut owned: Vec<Lease> = Vec::new();
        let mut live_owners: BTreeSet<&str> = BTreeSet::new();

        for lease in leases {
            if lease.is_available_at(now) {
                available.push(lease.clone());
            } else if lease.owned_by(&self.host_name) {
                owned.push(lease.clone());
                live_owners.insert(self.host_name.as_str());
            } else if let Some(owner) = lease.owner.as_deref() {
                live_owners.insert(owner);
            }
        }
        live_owners.insert(self.host_name.as_str());

        let total_partitions = leases.len();
        let active_instances = live_owners.len();
        let desired_count = if total_partitions == 0 {
            0
        } else {
            total_partitions.div_ceil(active_instances)
        };

        available.sort_by(|a, b| a.partition_id.cmp(&b.partition_id));
        owned.sort_by(|a, b| a.partition_id.cmp(&b.partition_id));

        let deficit = desired_count.saturating_sub(owned.len());
        let mut to_acquire = available;
        to_acquire.truncate(deficit);

        let surplus = owned.len().saturating_sub(desired_count);
        let to_release: Vec<String> = owned
            .iter()
            .rev()
            .take(surplus)
            .map(|l| l.partition_id.clone())
            .collect();

        debug!(
            host = %self.host_name,
            total = total_partitions,
            instances = active_instances,
            desired = desired_count,
            owned = owned.len(),
            acquirable = to_acquire.len(),
            shedding = to_release.len(),
            "Planned rebalance cycle"
        );

        BalancePlan {
            total_partitions,
            active_instances,
            desired_count,
            owned,
            to_acquire,
            to_release,
        }
    }
}
