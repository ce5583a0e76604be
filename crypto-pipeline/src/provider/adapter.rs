//! Presents four capability values as one named provider.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CryptoOperations, CryptoProvider, HealthMonitoring, KeyManagement, SignatureOperations};
use crate::error::CryptoResult;
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, HealthStatus, KeyGenerationRequest,
    KeyMetadata, KeyRequest, SignatureRequest, SignatureResult, VerificationRequest,
};

/// Pure delegation to one implementation per capability.
#[derive(Clone)]
pub struct ProviderAdapter {
    name: String,
    crypto: Arc<dyn CryptoOperations>,
    signatures: Arc<dyn SignatureOperations>,
    keys: Arc<dyn KeyManagement>,
    health: Arc<dyn HealthMonitoring>,
}

impl ProviderAdapter {
    /// Adapt four capability implementations under one name.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        crypto: Arc<dyn CryptoOperations>,
        signatures: Arc<dyn SignatureOperations>,
        keys: Arc<dyn KeyManagement>,
        health: Arc<dyn HealthMonitoring>,
    ) -> Self {
        Self {
            name: name.into(),
            crypto,
            signatures,
            keys,
            health,
        }
    }

    /// Adapt a full provider, taking every capability from it.
    #[must_use]
    pub fn from_provider<P: CryptoProvider + 'static>(provider: Arc<P>) -> Self {
        Self {
            name: provider.name().to_string(),
            crypto: provider.clone(),
            signatures: provider.clone(),
            keys: provider.clone(),
            health: provider,
        }
    }

    /// Replace the encryption capability.
    #[must_use]
    pub fn with_crypto(mut self, crypto: Arc<dyn CryptoOperations>) -> Self {
        self.crypto = crypto;
        self
    }

    /// Replace the signature capability.
    #[must_use]
    pub fn with_signatures(mut self, signatures: Arc<dyn SignatureOperations>) -> Self {
        self.signatures = signatures;
        self
    }

    /// Replace the key management capability.
    #[must_use]
    pub fn with_keys(mut self, keys: Arc<dyn KeyManagement>) -> Self {
        self.keys = keys;
        self
    }

    /// Replace the health capability.
    #[must_use]
    pub fn with_health(mut self, health: Arc<dyn HealthMonitoring>) -> Self {
        self.health = health;
        self
    }

    /// The current encryption capability.
    #[must_use]
    pub fn crypto(&self) -> Arc<dyn CryptoOperations> {
        Arc::clone(&self.crypto)
    }

    /// The current signature capability.
    #[must_use]
    pub fn signatures(&self) -> Arc<dyn SignatureOperations> {
        Arc::clone(&self.signatures)
    }

    /// The current key management capability.
    #[must_use]
    pub fn keys(&self) -> Arc<dyn KeyManagement> {
        Arc::clone(&self.keys)
    }

    /// The current health capability.
    #[must_use]
    pub fn health(&self) -> Arc<dyn HealthMonitoring> {
        Arc::clone(&self.health)
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CryptoOperations for ProviderAdapter {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        self.crypto.encrypt(request).await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        self.crypto.decrypt(request).await
    }
}

#[async_trait]
impl SignatureOperations for ProviderAdapter {
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        self.signatures.sign(request).await
    }

    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        self.signatures.verify(request).await
    }
}

#[async_trait]
impl KeyManagement for ProviderAdapter {
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        self.keys.generate_key(request).await
    }

    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.keys.rotate_key(request).await
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.keys.describe_key(request).await
    }
}

#[async_trait]
impl HealthMonitoring for ProviderAdapter {
    async fn health_check(&self) -> CryptoResult<HealthStatus> {
        self.health.health_check().await
    }
}

impl CryptoProvider for ProviderAdapter {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::provider::BaseProvider;

    struct Down;

    #[async_trait]
    impl HealthMonitoring for Down {
        async fn health_check(&self) -> CryptoResult<HealthStatus> {
            Err(CryptoError::unavailable("down"))
        }
    }

    #[tokio::test]
    async fn test_adapter_delegates_to_each_capability() {
        let base = Arc::new(BaseProvider::with_defaults());
        let adapter = ProviderAdapter::from_provider(base.clone()).with_health(Arc::new(Down));

        assert_eq!(adapter.name(), "local");
        let result = adapter
            .encrypt(&EncryptionRequest::new("k", b"data".to_vec()))
            .await
            .unwrap();
        assert_eq!(
            base.decrypt(&DecryptionRequest::from_result(&result)).await.unwrap(),
            b"data"
        );
        assert!(adapter.health_check().await.is_err());
    }
}
