//! Prometheus metrics for the coordination layer.
//!
//! Metrics cover lease lifecycle (acquisitions, conflicts, renewals, losses,
//! releases), delivery (batches, records, handler failures, checkpoints),
//! and lag (estimated pending changes).
//!
//! All metrics are registered to a custom registry with the "feedlock"
//! prefix to avoid name collisions with other libraries using the default
//! Prometheus registry. Registration errors are handled gracefully: if a
//! metric fails to register, the unregistered metric is used instead of
//! panicking, so instrumented code never fails because of metrics.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use tracing::warn;

/// Custom Prometheus registry for feedlock metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("feedlock".to_string()), None).unwrap_or_else(|_| Registry::new())
});

/// Register an IntCounter safely, returning an unregistered metric on error.
fn register_int_counter_safe(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(counter.clone())) {
        Ok(()) => counter,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntCounter metric, using unregistered fallback");
            counter
        }
    }
}

/// Register an IntGauge safely, returning an unregistered metric on error.
fn register_int_gauge_safe(registry: &Registry, name: &str, help: &str) -> IntGauge {
    let gauge = IntGauge::new(name, help).expect("metric name/help should be valid");
    match registry.register(Box::new(gauge.clone())) {
        Ok(()) => gauge,
        Err(e) => {
            warn!(name, error = %e, "Failed to register IntGauge metric, using unregistered fallback");
            gauge
        }
    }
}

// =============================================================================
// Lease lifecycle metrics
// =============================================================================

/// Total leases acquired by this instance.
pub static LEASES_ACQUIRED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "leases_acquired_total",
        "Total leases acquired by this instance",
    )
});

/// Total lease acquisitions lost to a concurrent writer.
pub static LEASE_CONFLICTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "lease_conflicts_total",
        "Total lease acquisitions lost to a concurrent writer",
    )
});

/// Total successful lease renewals.
pub static LEASES_RENEWED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "leases_renewed_total",
        "Total successful lease renewals",
    )
});

/// Total leases lost to another instance.
pub static LEASES_LOST: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "leases_lost_total",
        "Total leases lost to another instance",
    )
});

/// Total leases released voluntarily.
pub static LEASES_RELEASED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "leases_released_total",
        "Total leases released voluntarily",
    )
});

// =============================================================================
// Delivery metrics
// =============================================================================

/// Total change batches delivered to the handler.
pub static BATCHES_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "batches_delivered_total",
        "Total change batches delivered to the handler",
    )
});

/// Total change records delivered to the handler.
pub static RECORDS_DELIVERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "records_delivered_total",
        "Total change records delivered to the handler",
    )
});

/// Total batches the handler rejected.
pub static HANDLER_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "handler_failures_total",
        "Total batches the handler rejected",
    )
});

/// Total checkpoints persisted.
pub static CHECKPOINTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter_safe(
        &REGISTRY,
        "checkpoints_total",
        "Total checkpoints persisted",
    )
});

// =============================================================================
// Ownership and lag gauges
// =============================================================================

/// Partitions currently owned by this instance.
pub static OWNED_PARTITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge_safe(
        &REGISTRY,
        "owned_partitions",
        "Partitions currently owned by this instance",
    )
});

/// Estimated unprocessed changes across all partitions at the last estimate.
pub static ESTIMATED_LAG: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge_safe(
        &REGISTRY,
        "estimated_lag",
        "Estimated unprocessed changes across all partitions at the last estimate",
    )
});

/// Render all feedlock metrics in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = LEASES_ACQUIRED.get();
        LEASES_ACQUIRED.inc();
        assert_eq!(LEASES_ACQUIRED.get(), before + 1);
    }

    #[test]
    fn test_gauges_settable() {
        OWNED_PARTITIONS.set(3);
        assert_eq!(OWNED_PARTITIONS.get(), 3);
        OWNED_PARTITIONS.set(0);
    }

    #[test]
    fn test_gather_includes_prefix() {
        LEASES_RENEWED.inc();
        let text = gather();
        assert!(text.contains("feedlock_leases_renewed_total"));
    }
}
