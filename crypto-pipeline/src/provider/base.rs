//! In-memory provider backed by the algorithm registry.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::{CryptoOperations, CryptoProvider, HealthMonitoring, KeyManagement, SignatureOperations};
use crate::algorithms::{AES_256_GCM, HMAC_SHA256};
use crate::context::RequestContext;
use crate::error::{CryptoError, CryptoResult};
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, HealthStatus, KeyGenerationRequest,
    KeyMetadata, KeyPurpose, KeyRequest, SignatureRequest, SignatureResult, VerificationRequest,
};
use crate::registry::AlgorithmRegistry;

/// Base provider settings.
#[derive(Debug, Clone)]
pub struct BaseProviderConfig {
    /// Provider name reported in audit events
    pub name: String,
    /// Algorithm used when an encryption request names none
    pub default_encryption_algorithm: String,
    /// Algorithm used when a signature request names none
    pub default_signing_algorithm: String,
}

impl Default for BaseProviderConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            default_encryption_algorithm: AES_256_GCM.to_string(),
            default_signing_algorithm: HMAC_SHA256.to_string(),
        }
    }
}

impl BaseProviderConfig {
    /// Set the provider name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the default encryption algorithm.
    #[must_use]
    pub fn with_default_encryption_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.default_encryption_algorithm = algorithm.into();
        self
    }

    /// Set the default signing algorithm.
    #[must_use]
    pub fn with_default_signing_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.default_signing_algorithm = algorithm.into();
        self
    }
}

struct StoredKey {
    material: Zeroizing<Vec<u8>>,
    metadata: KeyMetadata,
}

impl StoredKey {
    fn generate(key_id: &str, purpose: KeyPurpose, algorithm: Option<&str>, len: usize) -> Self {
        Self {
            material: random_key(len),
            metadata: KeyMetadata {
                key_id: key_id.to_string(),
                purpose,
                algorithm: algorithm.map(str::to_string),
                version: 1,
                created_at: Utc::now(),
                rotated_at: None,
            },
        }
    }
}

type KeyStore = RwLock<HashMap<String, StoredKey>>;

fn random_key(len: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; len]);
    rand::thread_rng().fill_bytes(key.as_mut_slice());
    key
}

fn ensure_active(context: &RequestContext) -> CryptoResult<()> {
    if context.is_cancelled() {
        Err(CryptoError::Cancelled(format!(
            "request {} cancelled before start",
            context.correlation_id
        )))
    } else {
        Ok(())
    }
}

/// Minimal provider implementing all four capabilities over in-memory keys.
///
/// Encryption and signing keys live in separate namespaces, so the same
/// identifier names two unrelated keys. `encrypt` and `sign` provision an
/// unseen identifier on first use; `decrypt` and `verify` never do.
///
/// Rotation replaces the material under the same identifier and keeps no
/// prior version: data sealed before a rotation no longer decrypts.
pub struct BaseProvider {
    config: BaseProviderConfig,
    registry: AlgorithmRegistry,
    encryption_keys: KeyStore,
    signing_keys: KeyStore,
}

impl BaseProvider {
    /// Create a provider over the given registry.
    #[must_use]
    pub fn new(config: BaseProviderConfig, registry: AlgorithmRegistry) -> Self {
        Self {
            config,
            registry,
            encryption_keys: RwLock::new(HashMap::new()),
            signing_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Create a provider with default settings and the default algorithms.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BaseProviderConfig::default(), AlgorithmRegistry::with_defaults())
    }

    /// Provider settings.
    #[must_use]
    pub fn config(&self) -> &BaseProviderConfig {
        &self.config
    }

    /// The registry strategies are resolved from.
    #[must_use]
    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Whether a key exists in the given namespace.
    pub async fn has_key(&self, purpose: KeyPurpose, key_id: &str) -> bool {
        self.store(purpose).read().await.contains_key(key_id)
    }

    /// Number of keys in the given namespace.
    pub async fn key_count(&self, purpose: KeyPurpose) -> usize {
        self.store(purpose).read().await.len()
    }

    fn store(&self, purpose: KeyPurpose) -> &KeyStore {
        match purpose {
            KeyPurpose::Encryption => &self.encryption_keys,
            KeyPurpose::Signing => &self.signing_keys,
        }
    }

    /// Run `f` with the key's material, provisioning it if unseen.
    async fn with_provisioned_key<R: Send>(
        &self,
        purpose: KeyPurpose,
        key_id: &str,
        algorithm: &str,
        key_len: usize,
        f: impl FnOnce(&[u8]) -> CryptoResult<R> + Send,
    ) -> CryptoResult<R> {
        let mut keys = self.store(purpose).write().await;
        let key = keys.entry(key_id.to_string()).or_insert_with(|| {
            debug!(key_id = %key_id, ?purpose, "Provisioning key on first use");
            StoredKey::generate(key_id, purpose, Some(algorithm), key_len)
        });
        f(&key.material)
    }

    /// Run `f` with the key's material, failing if the key is unknown.
    async fn with_existing_key<R: Send>(
        &self,
        purpose: KeyPurpose,
        key_id: &str,
        f: impl FnOnce(&[u8]) -> CryptoResult<R> + Send,
    ) -> CryptoResult<R> {
        let keys = self.store(purpose).read().await;
        let key = keys
            .get(key_id)
            .ok_or_else(|| CryptoError::key_not_found(key_id))?;
        f(&key.material)
    }
}

#[async_trait]
impl CryptoOperations for BaseProvider {
    #[instrument(skip(self, request), fields(provider = %self.config.name, key_id = %request.key_id))]
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        ensure_active(&request.context)?;
        let algorithm = request
            .algorithm
            .as_deref()
            .unwrap_or(&self.config.default_encryption_algorithm);
        let strategy = self.registry.encryption(algorithm)?;
        let descriptor = strategy.descriptor();

        let sealed = self
            .with_provisioned_key(
                KeyPurpose::Encryption,
                &request.key_id,
                &descriptor.id,
                descriptor.key_len,
                |key| strategy.encrypt(key, &request.plaintext, request.additional_data.as_deref()),
            )
            .await?;

        Ok(EncryptionResult {
            ciphertext: sealed.ciphertext,
            iv: sealed.nonce,
            auth_tag: sealed.tag,
            key_id: request.key_id.clone(),
            algorithm: descriptor.id.clone(),
            additional_data: request.additional_data.clone(),
        })
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, key_id = %request.key_id))]
    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        ensure_active(&request.context)?;
        self.with_existing_key(KeyPurpose::Encryption, &request.key_id, |key| {
            self.registry.encryption(&request.algorithm)?.decrypt(
                key,
                &request.ciphertext,
                &request.iv,
                &request.auth_tag,
                request.additional_data.as_deref(),
            )
        })
        .await
    }
}

#[async_trait]
impl SignatureOperations for BaseProvider {
    #[instrument(skip(self, request), fields(provider = %self.config.name, key_id = %request.key_id))]
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        ensure_active(&request.context)?;
        let algorithm = request
            .algorithm
            .as_deref()
            .unwrap_or(&self.config.default_signing_algorithm);
        let strategy = self.registry.signature(algorithm)?;
        let descriptor = strategy.descriptor();

        let signature = self
            .with_provisioned_key(
                KeyPurpose::Signing,
                &request.key_id,
                &descriptor.id,
                descriptor.key_len,
                |key| strategy.sign(key, &request.data),
            )
            .await?;

        Ok(SignatureResult {
            signature,
            key_id: request.key_id.clone(),
            algorithm: descriptor.id.clone(),
        })
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, key_id = %request.key_id))]
    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        ensure_active(&request.context)?;
        self.with_existing_key(KeyPurpose::Signing, &request.key_id, |key| {
            self.registry
                .signature(&request.algorithm)?
                .verify(key, &request.data, &request.signature)
        })
        .await
    }
}

#[async_trait]
impl KeyManagement for BaseProvider {
    #[instrument(skip(self, request), fields(provider = %self.config.name))]
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        ensure_active(&request.context)?;
        let key_len = match request.algorithm.as_deref() {
            Some(id) => {
                self.registry
                    .get(id, request.purpose.algorithm_kind())?
                    .descriptor()
                    .key_len
            }
            None => 32,
        };
        let key_id = request
            .key_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut keys = self.store(request.purpose).write().await;
        if keys.contains_key(&key_id) {
            return Err(CryptoError::invalid_input(format!("Key already exists: {key_id}")));
        }
        let key = StoredKey::generate(&key_id, request.purpose, request.algorithm.as_deref(), key_len);
        let metadata = key.metadata.clone();
        keys.insert(key_id, key);

        info!(key_id = %metadata.key_id, purpose = ?metadata.purpose, "Generated key");
        Ok(metadata)
    }

    #[instrument(skip(self, request), fields(provider = %self.config.name, key_id = %request.key_id))]
    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        ensure_active(&request.context)?;
        let mut keys = self.store(request.purpose).write().await;
        let key = keys
            .get_mut(&request.key_id)
            .ok_or_else(|| CryptoError::key_not_found(&request.key_id))?;

        // The old buffer is zeroized when it is dropped here
        key.material = random_key(key.material.len());
        key.metadata.version += 1;
        key.metadata.rotated_at = Some(Utc::now());

        info!(version = key.metadata.version, "Rotated key");
        Ok(key.metadata.clone())
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        ensure_active(&request.context)?;
        self.store(request.purpose)
            .read()
            .await
            .get(&request.key_id)
            .map(|key| key.metadata.clone())
            .ok_or_else(|| CryptoError::key_not_found(&request.key_id))
    }
}

#[async_trait]
impl HealthMonitoring for BaseProvider {
    async fn health_check(&self) -> CryptoResult<HealthStatus> {
        if self.registry.is_empty() {
            return Ok(HealthStatus::unhealthy(&self.config.name, "no algorithms registered"));
        }
        Ok(HealthStatus::healthy(&self.config.name))
    }
}

impl std::fmt::Debug for BaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseProvider")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl CryptoProvider for BaseProvider {
    fn name(&self) -> &str {
        &self.config.name
    }
}
