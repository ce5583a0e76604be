//! Provider factory assembling decorated compositions.

use std::sync::Arc;

use pipeline_common::{CircuitBreakerConfig, RetryPolicy};
use tracing::info;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::{DecoratorSet, PipelineConfig};
use crate::decorators::{AuditLayer, CircuitBreakerHealthMonitoring, MetricsLayer, PolicyLayer, RetryLayer};
use crate::error::{CryptoError, CryptoResult};
use crate::metrics::{MetricsCollector, NoopMetricsCollector};
use crate::policy::{PolicyChecker, RulePolicyChecker};
use crate::provider::{
    BaseProvider, BaseProviderConfig, CryptoOperations, CryptoProvider, HealthMonitoring,
    KeyManagement, ProviderAdapter, SignatureOperations,
};
use crate::registry::AlgorithmRegistry;

/// Collaborators the decorators report to.
#[derive(Clone)]
pub struct DecoratorDeps {
    /// Checker used by the policy layer
    pub policy: Arc<dyn PolicyChecker>,
    /// Sink used by the audit layer
    pub audit_sink: Arc<dyn AuditSink>,
    /// Collector used by the metrics layer
    pub metrics: Arc<dyn MetricsCollector>,
    /// Policy used by the retry layer
    pub retry: RetryPolicy,
    /// Settings for the health circuit breaker
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for DecoratorDeps {
    fn default() -> Self {
        Self {
            policy: Arc::new(RulePolicyChecker::default()),
            audit_sink: Arc::new(TracingAuditSink),
            metrics: Arc::new(NoopMetricsCollector),
            retry: RetryPolicy::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl DecoratorDeps {
    /// Set the policy checker.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn PolicyChecker>) -> Self {
        self.policy = policy;
        self
    }

    /// Set the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = sink;
        self
    }

    /// Set the metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the circuit breaker settings.
    #[must_use]
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }
}

/// Builds composed providers.
pub struct ProviderFactory;

impl ProviderFactory {
    /// Wrap `base` with the enabled decorators.
    ///
    /// Layers are always applied innermost to outermost as policy, audit,
    /// retry, metrics, whatever order the set was built in. The circuit
    /// breaker wraps only the health capability.
    #[must_use]
    pub fn build<P: CryptoProvider + 'static>(
        base: Arc<P>,
        decorators: &DecoratorSet,
        deps: &DecoratorDeps,
    ) -> Arc<ProviderAdapter> {
        let name = base.name().to_string();
        let key_metadata: Arc<dyn KeyManagement> = base.clone();
        let mut crypto: Arc<dyn CryptoOperations> = base.clone();
        let mut signatures: Arc<dyn SignatureOperations> = base.clone();
        let mut keys: Arc<dyn KeyManagement> = base.clone();
        let mut health: Arc<dyn HealthMonitoring> = base;

        if decorators.policy {
            crypto = Arc::new(
                PolicyLayer::new(crypto, deps.policy.clone()).with_key_metadata(key_metadata.clone()),
            );
            signatures = Arc::new(
                PolicyLayer::new(signatures, deps.policy.clone())
                    .with_key_metadata(key_metadata.clone()),
            );
            keys = Arc::new(PolicyLayer::new(keys, deps.policy.clone()));
        }

        if decorators.audit {
            crypto = Arc::new(AuditLayer::new(crypto, deps.audit_sink.clone(), name.clone()));
            signatures = Arc::new(AuditLayer::new(signatures, deps.audit_sink.clone(), name.clone()));
            keys = Arc::new(AuditLayer::new(keys, deps.audit_sink.clone(), name.clone()));
        }

        if decorators.retry {
            crypto = Arc::new(RetryLayer::new(crypto, deps.retry.clone()));
            signatures = Arc::new(RetryLayer::new(signatures, deps.retry.clone()));
            keys = Arc::new(RetryLayer::new(keys, deps.retry.clone()));
        }

        if decorators.metrics {
            crypto = Arc::new(MetricsLayer::new(crypto, deps.metrics.clone()));
            signatures = Arc::new(MetricsLayer::new(signatures, deps.metrics.clone()));
            keys = Arc::new(MetricsLayer::new(keys, deps.metrics.clone()));
        }

        if decorators.circuit_breaker {
            health = Arc::new(CircuitBreakerHealthMonitoring::new(
                health,
                name.clone(),
                deps.circuit_breaker.clone(),
            ));
        }

        info!(provider = %name, ?decorators, "Built crypto provider");
        Arc::new(ProviderAdapter::new(name, crypto, signatures, keys, health))
    }

    /// Build a base provider from `config` and decorate it.
    ///
    /// The configured retry and circuit breaker settings replace those in
    /// `deps`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the configuration does not validate or names
    /// an unregistered default algorithm.
    pub fn from_config(config: &PipelineConfig, deps: DecoratorDeps) -> CryptoResult<Arc<ProviderAdapter>> {
        config
            .validate()
            .map_err(|e| CryptoError::invalid_input(e.to_string()))?;

        let registry = AlgorithmRegistry::with_defaults();
        registry
            .encryption(&config.default_encryption_algorithm)
            .and(registry.signature(&config.default_signing_algorithm))
            .map_err(|e| CryptoError::invalid_input(e.to_string()))?;

        let base = Arc::new(BaseProvider::new(
            BaseProviderConfig::default()
                .with_name(&config.provider_name)
                .with_default_encryption_algorithm(&config.default_encryption_algorithm)
                .with_default_signing_algorithm(&config.default_signing_algorithm),
            registry,
        ));
        let deps = deps
            .with_retry(RetryPolicy::new(config.retry.clone()))
            .with_circuit_breaker(config.circuit_breaker.clone());

        Ok(Self::build(base, &config.decorators, &deps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecryptionRequest, EncryptionRequest};

    #[tokio::test]
    async fn test_from_default_config() {
        let provider = ProviderFactory::from_config(&PipelineConfig::default(), DecoratorDeps::default()).unwrap();
        assert_eq!(provider.name(), "local");

        let result = provider
            .encrypt(&EncryptionRequest::new("k", b"payload".to_vec()))
            .await
            .unwrap();
        let plain = provider
            .decrypt(&DecryptionRequest::from_result(&result))
            .await
            .unwrap();
        assert_eq!(plain, b"payload");
        assert!(provider.health_check().await.unwrap().healthy);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig::default().with_provider_name("");
        assert!(matches!(
            ProviderFactory::from_config(&config, DecoratorDeps::default()),
            Err(CryptoError::InvalidInput(_))
        ));

        let config = PipelineConfig::default().with_default_signing_algorithm("AES-256-GCM");
        assert!(matches!(
            ProviderFactory::from_config(&config, DecoratorDeps::default()),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_undecorated_build_is_plain_delegation() {
        let base = Arc::new(BaseProvider::with_defaults());
        let provider = ProviderFactory::build(base.clone(), &DecoratorSet::none(), &DecoratorDeps::default());
        provider
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(base.key_count(crate::models::KeyPurpose::Encryption).await, 1);
    }
}
