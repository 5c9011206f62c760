//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `marea_operations_committed_total{operation}` - Committed units of work
//! - `marea_operations_rejected_total{operation,kind}` - Rejected units of work
//! - `marea_commit_duration_seconds` - Histogram of unit-of-work latencies
//! - `marea_records_written_total` - Entities written (indices excluded)

use crate::error::ErrorKind;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed operations by name
    pub operations_committed: IntCounterVec,

    /// Rejected operations by name and error kind
    pub operations_rejected: IntCounterVec,

    /// Unit-of-work duration histogram
    pub commit_duration: Histogram,

    /// Entities written
    pub records_written: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("records_written", &self.records_written.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_committed = IntCounterVec::new(
            Opts::new(
                "marea_operations_committed_total",
                "Total number of committed operations",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(operations_committed.clone()))?;

        let operations_rejected = IntCounterVec::new(
            Opts::new(
                "marea_operations_rejected_total",
                "Total number of rejected operations",
            ),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(operations_rejected.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "marea_commit_duration_seconds",
                "Histogram of unit-of-work latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        let records_written = IntCounter::new(
            "marea_records_written_total",
            "Total number of entities written",
        )?;
        registry.register(Box::new(records_written.clone()))?;

        Ok(Self {
            operations_committed,
            operations_rejected,
            commit_duration,
            records_written,
            registry,
        })
    }

    /// Record a committed operation
    pub fn record_committed(&self, operation: &str, records: usize, duration_seconds: f64) {
        self.operations_committed
            .with_label_values(&[operation])
            .inc();
        self.records_written.inc_by(records as u64);
        self.commit_duration.observe(duration_seconds);
    }

    /// Record a rejected operation
    pub fn record_rejected(&self, operation: &str, kind: ErrorKind) {
        self.operations_rejected
            .with_label_values(&[operation, kind.as_str()])
            .inc();
    }

    /// Committed count for one operation
    pub fn committed(&self, operation: &str) -> u64 {
        self.operations_committed
            .with_label_values(&[operation])
            .get()
    }

    /// Rejected count for one operation and error kind
    pub fn rejected(&self, operation: &str, kind: ErrorKind) -> u64 {
        self.operations_rejected
            .with_label_values(&[operation, kind.as_str()])
            .get()
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.records_written.get(), 0);
        assert_eq!(metrics.committed("create_trip"), 0);
    }

    #[test]
    fn test_independent_instances() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.record_committed("create_trip", 1, 0.001);
        assert_eq!(first.committed("create_trip"), 1);
        assert_eq!(second.committed("create_trip"), 0);
    }

    #[test]
    fn test_record_committed() {
        let metrics = Metrics::new().unwrap();
        metrics.record_committed("register_production", 3, 0.002);
        metrics.record_committed("register_production", 2, 0.004);
        assert_eq!(metrics.committed("register_production"), 2);
        assert_eq!(metrics.records_written.get(), 5);
        assert_eq!(metrics.commit_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_rejected() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejected("activate_trip", ErrorKind::Validation);
        assert_eq!(metrics.rejected("activate_trip", ErrorKind::Validation), 1);
        assert_eq!(metrics.rejected("activate_trip", ErrorKind::System), 0);
    }

    #[test]
    fn test_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_committed("increase_quota", 1, 0.001);
        let text = metrics.render();
        assert!(text.contains("marea_operations_committed_total"));
        assert!(text.contains("increase_quota"));
    }
}
