//! Ready-made configurations and collaborators for tests.

use std::sync::Arc;
use std::time::Duration;

use crypto_pipeline::{
    AuditSink, DecoratorDeps, EnvelopeConfig, MetricsCollector, PipelineConfig, PolicyRule,
    RulePolicyChecker,
};
use pipeline_common::{CircuitBreakerConfig, RetryConfig, RetryPolicy};

/// Retry settings with millisecond backoff so tests stay fast.
#[must_use]
pub fn fast_retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(max_attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
}

/// Retry policy over [`fast_retry_config`].
#[must_use]
pub fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(fast_retry_config(max_attempts))
}

/// Breaker settings with a short reset timeout.
#[must_use]
pub const fn breaker_config(
    failure_threshold: u32,
    success_threshold: u32,
    reset_timeout: Duration,
) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        failure_threshold,
        success_threshold,
        reset_timeout,
    }
}

/// Checker allowing only the given key identifiers for every action.
#[must_use]
pub fn tenant_policy<I, S>(allowed_key_ids: I) -> Arc<RulePolicyChecker>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Arc::new(
        RulePolicyChecker::default()
            .with_rule(PolicyRule::new("tenant-keys").with_allowed_key_ids(allowed_key_ids)),
    )
}

/// Decorator collaborators reporting to the given sink and collector.
#[must_use]
pub fn recorded_deps(
    audit_sink: Arc<dyn AuditSink>,
    metrics: Arc<dyn MetricsCollector>,
) -> DecoratorDeps {
    DecoratorDeps::default()
        .with_audit_sink(audit_sink)
        .with_metrics(metrics)
        .with_retry(fast_retry_policy(3))
}

/// Pipeline configuration with fast retries and a small envelope cache.
#[must_use]
pub fn sample_pipeline_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_provider_name("test-provider")
        .with_retry(fast_retry_config(3))
        .with_circuit_breaker(breaker_config(3, 2, Duration::from_millis(50)))
        .with_envelope(
            EnvelopeConfig::default()
                .with_default_key_id("envelope-master")
                .with_cache_max_size(8)
                .with_cache_ttl(Duration::from_secs(60)),
        )
}
