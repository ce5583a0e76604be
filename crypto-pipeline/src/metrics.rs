//! Metrics collectors for pipeline operations.

use std::time::Duration;

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use tracing::warn;

/// Sink for operation measurements. Must never fail into the call path.
pub trait MetricsCollector: Send + Sync {
    /// Record the wall-clock latency of one operation.
    fn record_latency(&self, operation: &str, latency: Duration);

    /// Increment the counter for an operation with extra labels.
    fn increment_counter(&self, operation: &str, labels: &[(&str, &str)]);
}

/// Discards every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn record_latency(&self, _operation: &str, _latency: Duration) {}

    fn increment_counter(&self, _operation: &str, _labels: &[(&str, &str)]) {}
}

struct PrometheusMetrics {
    latency: HistogramVec,
    operations: CounterVec,
}

/// Prometheus-backed collector over an owned [`Registry`].
///
/// Exposes `crypto_pipeline_operation_latency_seconds{operation}` and
/// `crypto_pipeline_operations_total{operation,status}`. If registration
/// fails the collector records nothing.
pub struct PrometheusMetricsCollector {
    registry: Registry,
    metrics: Option<PrometheusMetrics>,
}

impl PrometheusMetricsCollector {
    /// Create a collector with its own registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Registry::new())
    }

    /// Create a collector registering into `registry`.
    #[must_use]
    pub fn with_registry(registry: Registry) -> Self {
        let metrics = match Self::register(&registry) {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "Failed to register pipeline metrics, recording disabled");
                None
            }
        };
        Self { registry, metrics }
    }

    fn register(registry: &Registry) -> prometheus::Result<PrometheusMetrics> {
        let latency = HistogramVec::new(
            HistogramOpts::new(
                "crypto_pipeline_operation_latency_seconds",
                "Crypto pipeline operation latency including retries",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["operation"],
        )?;
        let operations = CounterVec::new(
            Opts::new("crypto_pipeline_operations_total", "Total crypto pipeline operations"),
            &["operation", "status"],
        )?;

        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(operations.clone()))?;
        Ok(PrometheusMetrics { latency, operations })
    }

    /// The registry holding this collector's metrics.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether registration succeeded.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.metrics.is_some()
    }

    /// Render every metric in the text exposition format.
    #[must_use]
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for PrometheusMetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector for PrometheusMetricsCollector {
    fn record_latency(&self, operation: &str, latency: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics
                .latency
                .with_label_values(&[operation])
                .observe(latency.as_secs_f64());
        }
    }

    fn increment_counter(&self, operation: &str, labels: &[(&str, &str)]) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let status = labels
            .iter()
            .find(|(name, _)| *name == "status")
            .map_or("unknown", |(_, value)| *value);
        metrics
            .operations
            .with_label_values(&[operation, status])
            .inc();
    }
}
