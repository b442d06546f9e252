//! OTLP metrics for store operations.
//!
//! Key metrics:
//! - stockroom_operations_total: Counter of store operations by collection and op
//! - stockroom_persist_latency_seconds: Histogram of physical write latency
//! - stockroom_cache_reloads_total: Counter of cache reloads from disk
//! - stockroom_index_fallbacks_total: Counter of index misses answered by scan
//!
//! Recording is a no-op until [`init_metrics`] has been called, so library
//! users that never opt in pay nothing.

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Stockroom metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Store operations, labelled by collection and op.
    pub operations_total: Counter<u64>,
    /// Latency of one atomic file write in seconds.
    pub persist_latency: Histogram<f64>,
    /// Cache reloads from the authoritative file.
    pub cache_reloads: Counter<u64>,
    /// Index candidates that failed verification.
    pub index_fallbacks: Counter<u64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            operations_total: meter
                .u64_counter("stockroom_operations_total")
                .with_description("Total number of store operations")
                .with_unit("1")
                .init(),
            persist_latency: meter
                .f64_histogram("stockroom_persist_latency_seconds")
                .with_description("Serialize, write, fsync and rename of one collection file")
                .with_unit("s")
                .init(),
            cache_reloads: meter
                .u64_counter("stockroom_cache_reloads_total")
                .with_description("Collection caches reloaded from disk")
                .with_unit("1")
                .init(),
            index_fallbacks: meter
                .u64_counter("stockroom_index_fallbacks_total")
                .with_description("Stale index lookups answered by a linear scan")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    set_manual_provider();
                }
            }
        } else {
            // Recorded but not exported.
            set_manual_provider();
        }

        let meter = global::meter("stockroom");
        Metrics::new(&meter)
    });
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

fn set_manual_provider() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Record one store operation.
pub fn record_operation(collection: &str, op: &'static str) {
    if let Some(m) = METRICS.get() {
        let attrs = [
            KeyValue::new("collection", collection.to_string()),
            KeyValue::new("op", op),
        ];
        m.operations_total.add(1, &attrs);
    }
}

/// Record one physical collection write.
pub fn record_persist(collection: &str, latency_seconds: f64) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("collection", collection.to_string())];
        m.persist_latency.record(latency_seconds, &attrs);
    }
}

/// Record a cache reload from disk.
pub fn record_cache_reload(collection: &str) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("collection", collection.to_string())];
        m.cache_reloads.add(1, &attrs);
    }
}

/// Record an index miss that fell back to a scan.
pub fn record_index_fallback(collection: &str) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new("collection", collection.to_string())];
        m.index_fallbacks.add(1, &attrs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_before_init_is_noop() {
        // Must not panic whether or not another test initialized metrics.
        record_operation("orders", "create");
        record_index_fallback("orders");
    }

    #[test]
    fn test_init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();
        assert!(metrics().is_some());
    }

    #[test]
    fn test_record_after_init() {
        init_metrics();
        record_operation("products", "update");
        record_persist("products", 0.002);
        record_cache_reload("products");
        record_index_fallback("products");
    }
}
