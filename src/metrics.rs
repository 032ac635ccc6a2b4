//! Metrics port
//!
//! The store reports counters, gauges and histograms through a [`Metrics`]
//! implementation handed to it at construction. Recording is infallible from
//! the store's point of view; a sink that cannot deliver must drop the sample.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

// Metric names emitted by the store and persistence layer.
pub const TRANSACTIONS_APPENDED: &str = "transactions_appended_total";
pub const APPEND_ERRORS: &str = "append_errors_total";
pub const APPEND_DURATION: &str = "append_transaction_seconds";
pub const WAL_WRITES: &str = "wal_writes_total";
pub const WAL_WRITE_DURATION: &str = "wal_write_seconds";
pub const SNAPSHOTS_CREATED: &str = "snapshots_created_total";
pub const RECOVERY_CORRUPTION: &str = "recovery_corruption_total";
pub const PARTITIONS: &str = "database_partitions_count";
pub const TRANSACTIONS: &str = "database_transactions_count";

/// Sink for numeric observability data
pub trait Metrics: Send + Sync {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, &str)]);

    fn set_gauge(&self, name: &'static str, value: f64);

    fn observe_histogram(&self, name: &'static str, value: f64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment_counter(&self, _name: &'static str, _labels: &[(&'static str, &str)]) {}

    fn set_gauge(&self, _name: &'static str, _value: f64) {}

    fn observe_histogram(&self, _name: &'static str, _value: f64) {}
}

/// Forwards everything to whatever `metrics::Recorder` the process has
/// installed. Without a recorder every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl Metrics for RecorderMetrics {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        let labels: Vec<::metrics::Label> = labels
            .iter()
            .map(|(key, value)| ::metrics::Label::new(*key, value.to_string()))
            .collect();
        ::metrics::counter!(name, labels).increment(1);
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        ::metrics::gauge!(name).set(value);
    }

    fn observe_histogram(&self, name: &'static str, value: f64) {
        ::metrics::histogram!(name).record(value);
    }
}

/// Count and sum of a histogram's observations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub max: f64,
}

/// Keeps every sample in memory; useful for tests and status dumps.
///
/// Counter keys are rendered as `name{label=value,...}`.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<BTreeMap<String, u64>>,
    gauges: Mutex<BTreeMap<&'static str, f64>>,
    histograms: Mutex<BTreeMap<&'static str, HistogramSummary>>,
}

impl InMemoryMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Value of a counter, 0 if never incremented
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        self.counters
            .lock()
            .get(&counter_key(name, labels))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of a counter across all label sets
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .iter()
            .filter(|(key, _)| key.as_str() == name || key.starts_with(&format!("{}{{", name)))
            .map(|(_, value)| *value)
            .sum()
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.gauges.lock().get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSummary> {
        self.histograms.lock().get(name).copied()
    }
}

impl Metrics for InMemoryMetrics {
    fn increment_counter(&self, name: &'static str, labels: &[(&'static str, &str)]) {
        *self.counters.lock().entry(counter_key(name, labels)).or_insert(0) += 1;
    }

    fn set_gauge(&self, name: &'static str, value: f64) {
        self.gauges.lock().insert(name, value);
    }

    fn observe_histogram(&self, name: &'static str, value: f64) {
        let mut histograms = self.histograms.lock();
        let summary = histograms.entry(name).or_default();
        summary.count += 1;
        summary.sum += value;
        if value > summary.max {
            summary.max = value;
        }
    }
}

fn counter_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}{{{}}}", name, rendered.join(","))
}
