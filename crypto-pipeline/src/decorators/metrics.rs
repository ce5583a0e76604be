use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::{CryptoError, CryptoResult};
use crate::metrics::MetricsCollector;
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, KeyGenerationRequest, KeyMetadata,
    KeyRequest, OperationType, SignatureRequest, SignatureResult, VerificationRequest,
};
use crate::provider::{CryptoOperations, KeyManagement, SignatureOperations};

/// Records one latency sample and one counter increment per call,
/// covering every retry beneath it. Policy rejections are not measured.
pub struct MetricsLayer<I: ?Sized> {
    inner: Arc<I>,
    collector: Arc<dyn MetricsCollector>,
}

impl<I: ?Sized> MetricsLayer<I> {
    /// Wrap `inner`, reporting to `collector`.
    #[must_use]
    pub fn new(inner: Arc<I>, collector: Arc<dyn MetricsCollector>) -> Self {
        Self { inner, collector }
    }

    async fn measure<T, F>(&self, operation: OperationType, call: F) -> CryptoResult<T>
    where
        T: Send,
        F: Future<Output = CryptoResult<T>> + Send,
    {
        let start = Instant::now();
        let outcome = call.await;
        let elapsed = start.elapsed();

        match &outcome {
            Err(CryptoError::PolicyViolation(_)) => {}
            Ok(_) => {
                self.collector.record_latency(operation.as_str(), elapsed);
                self.collector
                    .increment_counter(operation.as_str(), &[("status", "success")]);
            }
            Err(err) => {
                self.collector.record_latency(operation.as_str(), elapsed);
                self.collector.increment_counter(
                    operation.as_str(),
                    &[("status", "error"), ("error_code", err.kind().code())],
                );
            }
        }
        outcome
    }
}

#[async_trait]
impl<I: CryptoOperations + ?Sized> CryptoOperations for MetricsLayer<I> {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        self.measure(OperationType::Encrypt, self.inner.encrypt(request))
            .await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        self.measure(OperationType::Decrypt, self.inner.decrypt(request))
            .await
    }
}

#[async_trait]
impl<I: SignatureOperations + ?Sized> SignatureOperations for MetricsLayer<I> {
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        self.measure(OperationType::Sign, self.inner.sign(request)).await
    }

    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        self.measure(OperationType::Verify, self.inner.verify(request))
            .await
    }
}

#[async_trait]
impl<I: KeyManagement + ?Sized> KeyManagement for MetricsLayer<I> {
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        self.measure(OperationType::GenerateKey, self.inner.generate_key(request))
            .await
    }

    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.measure(OperationType::RotateKey, self.inner.rotate_key(request))
            .await
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.measure(OperationType::DescribeKey, self.inner.describe_key(request))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PrometheusMetricsCollector;
    use crate::policy::{PolicyRule, RulePolicyChecker};
    use crate::decorators::PolicyLayer;
    use crate::provider::BaseProvider;

    #[tokio::test]
    async fn test_success_and_error_are_counted() {
        let collector = Arc::new(PrometheusMetricsCollector::new());
        let layer = MetricsLayer::new(Arc::new(BaseProvider::with_defaults()), collector.clone());

        layer
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .unwrap();
        layer
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()).with_algorithm("rot13"))
            .await
            .unwrap_err();

        let text = collector.gather_text();
        assert!(text.contains("crypto_pipeline_operations_total{operation=\"encrypt\",status=\"success\"} 1"));
        assert!(text.contains("crypto_pipeline_operations_total{operation=\"encrypt\",status=\"error\"} 1"));
        assert!(text.contains("crypto_pipeline_operation_latency_seconds_count{operation=\"encrypt\"} 2"));
    }

    #[tokio::test]
    async fn test_policy_rejection_is_not_measured() {
        let collector = Arc::new(PrometheusMetricsCollector::new());
        let checker = Arc::new(
            RulePolicyChecker::default()
                .with_rule(PolicyRule::new("none").with_allowed_key_ids(Vec::<String>::new())),
        );
        let guarded = Arc::new(PolicyLayer::new(Arc::new(BaseProvider::with_defaults()), checker));
        let layer = MetricsLayer::new(guarded, collector.clone());

        assert!(layer
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .is_err());
        assert!(!collector.gather_text().contains("operation=\"encrypt\""));
    }
}
