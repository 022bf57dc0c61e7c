//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `stockledger_transactions_total` - Committed transactions
//! - `stockledger_lines_total` - Committed line items
//! - `stockledger_rejections_total{reason}` - Rejected transactions by reason
//! - `stockledger_record_duration_seconds` - Histogram of record latencies
//! - `stockledger_stock_reads_total` - Stock projection reads

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
///
/// Collectors are registered on an owned [`Registry`] rather than the
/// process default so independent instances never collide.
#[derive(Clone)]
pub struct Metrics {
    /// Committed transactions
    pub transactions_total: IntCounter,

    /// Committed line items
    pub lines_total: IntCounter,

    /// Rejected transactions, labeled by error reason
    pub rejections_total: IntCounterVec,

    /// Record latency histogram
    pub record_duration: Histogram,

    /// Stock projection reads
    pub stock_reads_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounter::new(
            "stockledger_transactions_total",
            "Total committed stock transactions",
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let lines_total = IntCounter::new(
            "stockledger_lines_total",
            "Total committed line items",
        )?;
        registry.register(Box::new(lines_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "stockledger_rejections_total",
                "Rejected transactions by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let record_duration = Histogram::with_opts(
            HistogramOpts::new(
                "stockledger_record_duration_seconds",
                "Histogram of recordTransaction latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(record_duration.clone()))?;

        let stock_reads_total = IntCounter::new(
            "stockledger_stock_reads_total",
            "Total stock projection reads",
        )?;
        registry.register(Box::new(stock_reads_total.clone()))?;

        Ok(Self {
            transactions_total,
            lines_total,
            rejections_total,
            record_duration,
            stock_reads_total,
            registry,
        })
    }

    /// Record a committed transaction
    pub fn record_commit(&self, line_count: usize) {
        self.transactions_total.inc();
        self.lines_total.inc_by(line_count as u64);
    }

    /// Record a rejection by reason code
    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    /// Record a record-transaction latency
    pub fn observe_duration(&self, duration_seconds: f64) {
        self.record_duration.observe(duration_seconds);
    }

    /// Record a stock projection read
    pub fn record_stock_read(&self) {
        self.stock_reads_total.inc();
    }

    /// Export all metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_total.get(), 0);
        assert_eq!(metrics.lines_total.get(), 0);
    }

    #[test]
    fn test_independent_instances_do_not_collide() {
        let _a = Metrics::new().unwrap();
        let _b = Metrics::new().unwrap();
    }

    #[test]
    fn test_record_commit() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit(3);
        metrics.record_commit(1);
        assert_eq!(metrics.transactions_total.get(), 2);
        assert_eq!(metrics.lines_total.get(), 4);
    }

    #[test]
    fn test_record_rejection_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rejection("InsufficientStock");
        metrics.record_rejection("InsufficientStock");
        metrics.record_rejection("EmptyTransaction");
        assert_eq!(
            metrics
                .rejections_total
                .with_label_values(&["InsufficientStock"])
                .get(),
            2
        );
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit(1);
        let text = metrics.export().unwrap();
        assert!(text.contains("stockledger_transactions_total"));
    }
}
