//! Metrics exporter interface.
//!
//! The cache emits operation timings and counter snapshots through
//! [`MetricsExporter`]; concrete backends (Prometheus and friends) live
//! outside this crate. [`TracingExporter`] records through `tracing`
//! events, which is enough for log-based metric pipelines and tests;
//! [`NoopExporter`] discards everything.

use std::time::Duration;

use crate::stats::CacheStats;

/// Label pairs attached to exported measurements.
pub type Labels = [(String, String)];

/// Sink for cache measurements.
///
/// Used as `Arc<dyn MetricsExporter>`. Implementations must be cheap to
/// call: exports happen on the operation path.
pub trait MetricsExporter: Send + Sync {
    /// Exports a full counter snapshot.
    fn export_stats(&self, stats: &CacheStats, labels: &Labels);

    /// Records the duration of a single cache operation.
    fn record_cache_operation(&self, operation: &str, duration: Duration, labels: &Labels);

    /// Adds `value` to a named counter.
    fn increment_counter(&self, name: &str, value: u64, labels: &Labels);

    /// Records a value into a named histogram.
    fn record_histogram(&self, name: &str, value: f64, labels: &Labels);

    /// Sets a named gauge.
    fn set_gauge(&self, name: &str, value: f64, labels: &Labels);

    /// Flushes and releases exporter resources.
    fn close(&self);
}

/// Exporter that discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExporter;

impl MetricsExporter for NoopExporter {
    fn export_stats(&self, _stats: &CacheStats, _labels: &Labels) {}
    fn record_cache_operation(&self, _operation: &str, _duration: Duration, _labels: &Labels) {}
    fn increment_counter(&self, _name: &str, _value: u64, _labels: &Labels) {}
    fn record_histogram(&self, _name: &str, _value: f64, _labels: &Labels) {}
    fn set_gauge(&self, _name: &str, _value: f64, _labels: &Labels) {}
    fn close(&self) {}
}

/// Exporter that records measurements as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExporter;

impl MetricsExporter for TracingExporter {
    fn export_stats(&self, stats: &CacheStats, labels: &Labels) {
        tracing::info!(
            hits = stats.hits,
            misses = stats.misses,
            evictions = stats.evictions,
            invalidations = stats.invalidations,
            in_flight = stats.in_flight,
            key_count = stats.key_count,
            hit_rate = stats.hit_rate(),
            ?labels,
            "cache stats"
        );
    }

    fn record_cache_operation(&self, operation: &str, duration: Duration, labels: &Labels) {
        #[allow(clippy::cast_possible_truncation)]
        let duration_us = duration.as_micros() as u64;
        tracing::debug!(operation, duration_us, ?labels, "cache operation");
    }

    fn increment_counter(&self, name: &str, value: u64, labels: &Labels) {
        tracing::debug!(counter = name, value, ?labels, "counter");
    }

    fn record_histogram(&self, name: &str, value: f64, labels: &Labels) {
        tracing::debug!(histogram = name, value, ?labels, "histogram");
    }

    fn set_gauge(&self, name: &str, value: f64, labels: &Labels) {
        tracing::debug!(gauge = name, value, ?labels, "gauge");
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Verifies `Arc<dyn MetricsExporter>` compiles (object safety).
    #[test]
    fn exporter_is_object_safe() {
        let exporters: Vec<Arc<dyn MetricsExporter>> =
            vec![Arc::new(NoopExporter), Arc::new(TracingExporter)];
        for exporter in exporters {
            exporter.export_stats(&CacheStats::default(), &[]);
            exporter.record_cache_operation("get", Duration::from_micros(5), &[]);
            exporter.increment_counter("cache_hits", 1, &[]);
            exporter.record_histogram("op_duration", 0.5, &[]);
            exporter.set_gauge("key_count", 3.0, &[]);
            exporter.close();
        }
    }
}
