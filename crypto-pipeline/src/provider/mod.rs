//! Capability traits and provider composition.
//!
//! A provider is split into four independent capabilities. Decorators wrap
//! one capability each; [`ProviderAdapter`] glues four capability values
//! back into a single [`CryptoProvider`].

mod adapter;
mod base;

pub use adapter::ProviderAdapter;
pub use base::{BaseProvider, BaseProviderConfig};

use async_trait::async_trait;

use crate::error::CryptoResult;
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, HealthStatus, KeyGenerationRequest,
    KeyMetadata, KeyRequest, SignatureRequest, SignatureResult, VerificationRequest,
};

/// Authenticated encryption and decryption.
#[async_trait]
pub trait CryptoOperations: Send + Sync {
    /// Encrypt a payload.
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult>;

    /// Decrypt a payload produced by [`CryptoOperations::encrypt`].
    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>>;
}

/// Message signing and verification.
#[async_trait]
pub trait SignatureOperations: Send + Sync {
    /// Sign a message.
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult>;

    /// Verify a signature. A mismatch is `Ok(false)`.
    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool>;
}

/// Key lifecycle.
#[async_trait]
pub trait KeyManagement: Send + Sync {
    /// Create a key.
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata>;

    /// Replace a key's material under the same identifier.
    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata>;

    /// Read a key's metadata.
    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata>;
}

/// Self-reported availability.
#[async_trait]
pub trait HealthMonitoring: Send + Sync {
    /// Report current health.
    async fn health_check(&self) -> CryptoResult<HealthStatus>;
}

/// A named provider offering all four capabilities.
pub trait CryptoProvider:
    CryptoOperations + SignatureOperations + KeyManagement + HealthMonitoring
{
    /// Provider name used in audit events and logs.
    fn name(&self) -> &str;
}

