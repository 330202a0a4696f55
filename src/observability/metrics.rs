//! # Metrics
//!
//! Prometheus metrics for monitoring the controllers.
//!
//! ## Metrics Exposed
//!
//! - `heist_reconciliations_total` - Total number of reconciliations
//! - `heist_reconciliation_errors_total` - Total number of reconciliation errors
//! - `heist_vault_operations_total` - Total number of Vault operations (by kind)

use prometheus::{IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "heist_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "heist_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static VAULT_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "heist_vault_operations_total",
            "Total number of Vault operations",
        ),
        &["operation"],
    )
    .expect("Failed to create VAULT_OPERATIONS_TOTAL metric - this should never happen")
});

/// Register all metrics with the shared registry. Call once at startup.
pub fn register_metrics() {
    let _ = REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(VAULT_OPERATIONS_TOTAL.clone()));
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn increment_vault_operations(operation: &str) {
    VAULT_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        register_metrics();
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1);

        let before = RECONCILIATION_ERRORS_TOTAL.get();
        increment_reconciliation_errors();
        assert_eq!(RECONCILIATION_ERRORS_TOTAL.get(), before + 1);
    }

    #[test]
    fn vault_operation_counter_tracks_labels() {
        register_metrics();
        increment_vault_operations("update_policy");
        increment_vault_operations("update_policy");
        assert!(
            VAULT_OPERATIONS_TOTAL
                .with_label_values(&["update_policy"])
                .get()
                >= 2
        );
    }
}
