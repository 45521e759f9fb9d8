//! OpenTelemetry metrics for store operations.
//!
//! Key metrics:
//! - memstore_operations_total: Counter of successful operations by kind
//! - memstore_operation_latency_seconds: Histogram of operation latency
//! - memstore_busy_total: Counter of operations that hit the busy timeout
//! - memstore_rows_written_total: Counter of rows written by batch stores

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

use crate::perf::OperationKind;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Memstore metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of successful operations.
    pub operations_total: Counter<u64>,
    /// Histogram of operation latency in seconds.
    pub operation_latency: Histogram<f64>,
    /// Operations that failed with `Busy`.
    pub busy_total: Counter<u64>,
    /// Rows written by batch stores.
    pub rows_written_total: Counter<u64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            operations_total: meter
                .u64_counter("memstore_operations_total")
                .with_description("Total number of successful store operations")
                .with_unit("1")
                .init(),
            operation_latency: meter
                .f64_histogram("memstore_operation_latency_seconds")
                .with_description("Store operation latency including transaction commit")
                .with_unit("s")
                .init(),
            busy_total: meter
                .u64_counter("memstore_busy_total")
                .with_description("Operations that exceeded the busy timeout")
                .with_unit("1")
                .init(),
            rows_written_total: meter
                .u64_counter("memstore_rows_written_total")
                .with_description("Rows written by batch stores")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// Metrics are recorded against a manual reader and can be collected
/// in-process. This should be called once at startup; subsequent calls are
/// ignored. Until it is called, every `record_*` function is a no-op.
pub fn init_metrics() {
    METRICS.get_or_init(|| {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        global::set_meter_provider(provider);

        let meter = global::meter("memstore");
        Metrics::new(&meter)
    });
}

/// Record a successful operation.
pub fn record_operation(kind: OperationKind, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("operation", kind.as_str())];
        m.operations_total.add(1, &attrs);
        m.operation_latency.record(latency_seconds, &attrs);
    }
}

/// Record an operation that failed with `Busy`.
pub fn record_busy(kind: OperationKind) {
    if let Some(m) = METRICS.get() {
        m.busy_total
            .add(1, &[KeyValue::new("operation", kind.as_str())]);
    }
}

/// Record rows written by a committed batch.
pub fn record_rows_written(rows: usize) {
    if let Some(m) = METRICS.get() {
        m.rows_written_total
            .add(u64::try_from(rows).unwrap_or(u64::MAX), &[]);
    }
}
