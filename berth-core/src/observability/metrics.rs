//! Core metrics definitions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters

use metrics::{counter, describe_counter};

/// Register all core metrics with descriptions.
pub fn register_core_metrics() {
    describe_counter!("berth_installs_total", "Total number of installs (by outcome)");
    describe_counter!(
        "berth_rollbacks_total",
        "Total number of install rollbacks (by phase: single, multi)"
    );
    describe_counter!(
        "berth_lifecycle_ops_total",
        "Total number of lifecycle operations (by operation)"
    );
    describe_counter!(
        "berth_warnings_total",
        "Total number of best-effort steps that failed (by kind)"
    );
    describe_counter!("berth_db_errors_total", "Total database failures (by operation)");
}

/// Count a finished install.
pub fn record_install(outcome: &'static str) {
    counter!("berth_installs_total", "outcome" => outcome).increment(1);
}

pub fn record_rollback(phase: &'static str) {
    counter!("berth_rollbacks_total", "phase" => phase).increment(1);
}

pub fn record_lifecycle_op(operation: &'static str) {
    counter!("berth_lifecycle_ops_total", "operation" => operation).increment(1);
}

/// Count a best-effort step that failed and was only logged.
pub fn record_warning(kind: &'static str) {
    counter!("berth_warnings_total", "kind" => kind).increment(1);
}
