//! Envelope encryption with cached data keys.
//!
//! Payloads are sealed locally with AES-256-GCM under a 32-byte data key.
//! The data key is wrapped by the underlying provider and travels with the
//! payload. Data keys are cached per `(key id, key version)` so repeated
//! encryption under one key skips the wrap call. Decryption always unwraps
//! through the provider and never reads the cache.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use pipeline_common::{CacheStats, LruTtlCache};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::algorithms::{Aes256GcmStrategy, EncryptionStrategy, AES_256_GCM};
use crate::config::EnvelopeConfig;
use crate::context::RequestContext;
use crate::error::{CryptoError, CryptoResult};
use crate::models::{AlgorithmKind, DecryptionRequest, EncryptionRequest, EncryptionResult};
use crate::provider::CryptoOperations;

const DATA_KEY_LEN: usize = 32;

/// Symmetric key sealing one envelope payload. Wiped when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; DATA_KEY_LEN]);

impl DataKey {
    /// Generate a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; DATA_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        let key = Self(bytes);
        bytes.zeroize();
        key
    }

    /// Rebuild a key from unwrapped bytes.
    ///
    /// # Errors
    ///
    /// Returns `Decryption` if `bytes` is not 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let mut array: [u8; DATA_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::decryption("unwrapped data key has the wrong length"))?;
        let key = Self(array);
        array.zeroize();
        Ok(key)
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// Sealed payload plus the wrapped data key needed to open it.
///
/// Both layers must be stored together; without `wrapped_data_key` the
/// ciphertext is unrecoverable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopePayload {
    /// Payload ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// Payload nonce
    pub nonce: Vec<u8>,
    /// Payload authentication tag
    pub auth_tag: Vec<u8>,
    /// Master key that wrapped the data key
    pub key_id: String,
    /// Payload algorithm
    pub algorithm: String,
    /// Caller data authenticated with the payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Vec<u8>>,
    /// The data key as encrypted by the provider
    pub wrapped_data_key: EncryptionResult,
}

struct CachedDataKey {
    key: DataKey,
    wrapped: EncryptionResult,
}

struct EnvelopeState {
    cache: LruTtlCache<String, CachedDataKey>,
    key_version: String,
}

/// Envelope encrypter over any provider offering [`CryptoOperations`].
///
/// One instance owns its cache; share the instance rather than building
/// several over the same master key.
pub struct EnvelopeEncrypter {
    provider: Arc<dyn CryptoOperations>,
    default_key_id: String,
    bulk: Aes256GcmStrategy,
    state: Mutex<EnvelopeState>,
}

impl EnvelopeEncrypter {
    /// Create an encrypter wrapping data keys through `provider`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the cache size is zero.
    pub fn new(provider: Arc<dyn CryptoOperations>, config: &EnvelopeConfig) -> CryptoResult<Self> {
        let max_size = NonZeroUsize::new(config.cache_max_size)
            .ok_or_else(|| CryptoError::invalid_input("envelope cache size must be greater than 0"))?;
        Ok(Self {
            provider,
            default_key_id: config.default_key_id.clone(),
            bulk: Aes256GcmStrategy::new(),
            state: Mutex::new(EnvelopeState {
                cache: LruTtlCache::new(max_size, config.cache_ttl),
                key_version: config.initial_key_version.clone(),
            }),
        })
    }

    /// Encrypt `plaintext` under `key_id`, or the default key when `None`.
    ///
    /// Two concurrent first calls for the same key may both miss the cache
    /// and wrap separate data keys; the later insert wins and both payloads
    /// stay decryptable.
    ///
    /// # Errors
    ///
    /// Returns any error from the provider's wrap call or from sealing.
    #[instrument(skip_all, fields(key_id = %key_id.unwrap_or(self.default_key_id.as_str())))]
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        additional_data: Option<&[u8]>,
        key_id: Option<&str>,
    ) -> CryptoResult<EnvelopePayload> {
        let key_id = key_id.unwrap_or(self.default_key_id.as_str()).to_string();

        let (cache_key, version, cached) = {
            let mut state = self.state.lock().await;
            let version = state.key_version.clone();
            let cache_key = format!("{key_id}|{version}");
            let cached = state
                .cache
                .get(&cache_key)
                .map(|entry| (entry.key.clone(), entry.wrapped.clone()));
            (cache_key, version, cached)
        };

        let (data_key, wrapped) = if let Some(hit) = cached {
            debug!("Data key cache hit");
            hit
        } else {
            debug!("Data key cache miss, wrapping a new data key");
            let data_key = DataKey::generate();
            let wrapped = self.wrap(&data_key, &key_id, &version).await?;
            self.state.lock().await.cache.set(
                cache_key,
                CachedDataKey {
                    key: data_key.clone(),
                    wrapped: wrapped.clone(),
                },
            );
            (data_key, wrapped)
        };

        let sealed = self
            .bulk
            .encrypt(data_key.as_bytes(), plaintext, additional_data)?;

        Ok(EnvelopePayload {
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            auth_tag: sealed.tag,
            key_id,
            algorithm: AES_256_GCM.to_string(),
            additional_data: additional_data.map(<[u8]>::to_vec),
            wrapped_data_key: wrapped,
        })
    }

    /// Decrypt a payload by unwrapping its data key through the provider.
    ///
    /// # Errors
    ///
    /// Returns `Decryption` if the wrapped key belongs to another master key
    /// or authentication fails, or any error from the provider's unwrap call.
    #[instrument(skip(self, payload), fields(key_id = %payload.key_id))]
    pub async fn decrypt(&self, payload: &EnvelopePayload) -> CryptoResult<Vec<u8>> {
        if payload.algorithm != AES_256_GCM {
            return Err(CryptoError::unsupported_algorithm(
                &payload.algorithm,
                AlgorithmKind::Encryption,
            ));
        }
        if payload.wrapped_data_key.key_id != payload.key_id {
            return Err(CryptoError::decryption(
                "wrapped data key does not belong to the payload key",
            ));
        }

        let unwrap = DecryptionRequest::from_result(&payload.wrapped_data_key);
        let raw = Zeroizing::new(self.provider.decrypt(&unwrap).await?);
        let data_key = DataKey::from_slice(&raw)?;

        self.bulk.decrypt(
            data_key.as_bytes(),
            &payload.ciphertext,
            &payload.nonce,
            &payload.auth_tag,
            payload.additional_data.as_deref(),
        )
    }

    /// Switch to a new key version, dropping every cached data key.
    ///
    /// Existing payloads stay decryptable since decryption never uses the
    /// cache.
    pub async fn rotate_key_version(&self, new_version: impl Into<String>) {
        let new_version = new_version.into();
        let mut state = self.state.lock().await;
        state.cache.clear();
        info!(from = %state.key_version, to = %new_version, "Rotated envelope key version");
        state.key_version = new_version;
    }

    /// Current key version tag.
    pub async fn key_version(&self) -> String {
        self.state.lock().await.key_version.clone()
    }

    /// Number of cached data keys.
    pub async fn cache_size(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    /// Cache hit, miss, eviction and expiry counts.
    pub async fn cache_stats(&self) -> CacheStats {
        self.state.lock().await.cache.stats()
    }

    /// Master key used when a call names none.
    #[must_use]
    pub fn default_key_id(&self) -> &str {
        &self.default_key_id
    }

    async fn wrap(&self, data_key: &DataKey, key_id: &str, version: &str) -> CryptoResult<EncryptionResult> {
        let mut request = EncryptionRequest {
            plaintext: data_key.as_bytes().to_vec(),
            key_id: key_id.to_string(),
            algorithm: None,
            additional_data: Some(format!("{key_id}|{version}").into_bytes()),
            context: RequestContext::new(),
        };
        let wrapped = self.provider.encrypt(&request).await;
        request.plaintext.zeroize();
        wrapped
    }
}

impl fmt::Debug for EnvelopeEncrypter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvelopeEncrypter")
            .field("default_key_id", &self.default_key_id)
            .finish_non_exhaustive()
    }
}
