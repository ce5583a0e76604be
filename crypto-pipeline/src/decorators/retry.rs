use std::sync::Arc;

use async_trait::async_trait;
use pipeline_common::RetryPolicy;

use crate::error::CryptoResult;
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, KeyGenerationRequest, KeyMetadata,
    KeyRequest, SignatureRequest, SignatureResult, VerificationRequest,
};
use crate::provider::{CryptoOperations, KeyManagement, SignatureOperations};

/// Repeats transient failures with exponential backoff.
///
/// Every attempt calls the inner layer again, so an audit layer below sees
/// each physical attempt. The last error is returned unchanged.
pub struct RetryLayer<I: ?Sized> {
    inner: Arc<I>,
    policy: RetryPolicy,
}

impl<I: ?Sized> RetryLayer<I> {
    /// Wrap `inner` with `policy`.
    #[must_use]
    pub fn new(inner: Arc<I>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The retry policy in use.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<I: CryptoOperations + ?Sized> CryptoOperations for RetryLayer<I> {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        self.policy.execute(move || self.inner.encrypt(request)).await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        self.policy.execute(move || self.inner.decrypt(request)).await
    }
}

#[async_trait]
impl<I: SignatureOperations + ?Sized> SignatureOperations for RetryLayer<I> {
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        self.policy.execute(move || self.inner.sign(request)).await
    }

    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        self.policy.execute(move || self.inner.verify(request)).await
    }
}

#[async_trait]
impl<I: KeyManagement + ?Sized> KeyManagement for RetryLayer<I> {
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        self.policy.execute(move || self.inner.generate_key(request)).await
    }

    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.policy.execute(move || self.inner.rotate_key(request)).await
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.policy.execute(move || self.inner.describe_key(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use pipeline_common::RetryConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        error: CryptoError,
    }

    #[async_trait]
    impl CryptoOperations for Flaky {
        async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(self.error.clone());
            }
            Ok(EncryptionResult {
                ciphertext: request.plaintext.clone(),
                iv: vec![],
                auth_tag: vec![],
                key_id: request.key_id.clone(),
                algorithm: "test".to_string(),
                additional_data: None,
            })
        }

        async fn decrypt(&self, _request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
            Err(self.error.clone())
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_max_attempts(max_attempts)
                .with_initial_delay(Duration::from_millis(1)),
        )
    }

    fn flaky(failures: u32, error: CryptoError) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
            error,
        })
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let inner = flaky(2, CryptoError::unavailable("hsm"));
        let layer = RetryLayer::new(inner.clone(), fast_policy(3));

        let result = layer
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .unwrap();
        assert_eq!(result.ciphertext, b"x");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_last_error_unchanged() {
        let inner = flaky(10, CryptoError::Timeout("slow".to_string()));
        let layer = RetryLayer::new(inner.clone(), fast_policy(3));

        let err = layer
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err, CryptoError::Timeout("slow".to_string()));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let inner = flaky(10, CryptoError::policy_violation("no"));
        let layer = RetryLayer::new(inner.clone(), fast_policy(5));

        assert!(layer
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_excluded_codes_are_not_retried() {
        let inner = flaky(10, CryptoError::RateLimited);
        let policy = RetryPolicy::new(
            RetryConfig::default()
                .with_initial_delay(Duration::from_millis(1))
                .excluding_code("RATE_LIMITED"),
        );
        let layer = RetryLayer::new(inner.clone(), policy);

        assert_eq!(
            layer.encrypt(&EncryptionRequest::new("k", b"x".to_vec())).await,
            Err(CryptoError::RateLimited)
        );
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
