//! Request and result value objects for provider operations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;

/// The two families of algorithm strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    /// Authenticated symmetric encryption
    Encryption,
    /// Message signing and verification
    Signature,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encryption => f.write_str("encryption"),
            Self::Signature => f.write_str("signature"),
        }
    }
}

/// Static description of one registered algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmDescriptor {
    /// Registry identifier, e.g. `AES-256-GCM`
    pub id: String,
    /// Strategy family
    pub kind: AlgorithmKind,
    /// Required key (or seed) length in bytes
    pub key_len: usize,
    /// Nonce length in bytes; zero for signatures
    pub nonce_len: usize,
    /// Authentication tag or signature length in bytes
    pub tag_len: usize,
}

/// Operation names used in audit events and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Encrypt
    Encrypt,
    /// Decrypt
    Decrypt,
    /// Sign
    Sign,
    /// Verify
    Verify,
    /// Generate key
    GenerateKey,
    /// Rotate key
    RotateKey,
    /// Describe key
    DescribeKey,
    /// Health check
    HealthCheck,
}

impl OperationType {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::GenerateKey => "generate_key",
            Self::RotateKey => "rotate_key",
            Self::DescribeKey => "describe_key",
            Self::HealthCheck => "health_check",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to encrypt a payload under a key.
#[derive(Debug, Clone)]
pub struct EncryptionRequest {
    /// Bytes to encrypt
    pub plaintext: Vec<u8>,
    /// Key identifier; unseen identifiers are provisioned on first use
    pub key_id: String,
    /// Algorithm identifier; the provider default when `None`
    pub algorithm: Option<String>,
    /// Authenticated but unencrypted data
    pub additional_data: Option<Vec<u8>>,
    /// Correlation and cancellation
    pub context: RequestContext,
}

impl EncryptionRequest {
    /// Create a request using the provider's default algorithm.
    #[must_use]
    pub fn new(key_id: impl Into<String>, plaintext: impl Into<Vec<u8>>) -> Self {
        Self {
            plaintext: plaintext.into(),
            key_id: key_id.into(),
            algorithm: None,
            additional_data: None,
            context: RequestContext::new(),
        }
    }

    /// Request a specific algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    /// Bind additional authenticated data.
    #[must_use]
    pub fn with_additional_data(mut self, aad: impl Into<Vec<u8>>) -> Self {
        self.additional_data = Some(aad.into());
        self
    }

    /// Replace the request context.
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// Output of an encryption.
///
/// `key_id` and `algorithm` are always the values the provider actually
/// used, never an unresolved caller alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionResult {
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// Nonce / initialization vector
    pub iv: Vec<u8>,
    /// Authentication tag
    pub auth_tag: Vec<u8>,
    /// Resolved key identifier
    pub key_id: String,
    /// Resolved algorithm identifier
    pub algorithm: String,
    /// Additional authenticated data bound to the ciphertext
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Vec<u8>>,
}

/// Request to decrypt a previous [`EncryptionResult`].
#[derive(Debug, Clone)]
pub struct DecryptionRequest {
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// Nonce used at encryption
    pub iv: Vec<u8>,
    /// Authentication tag
    pub auth_tag: Vec<u8>,
    /// Key identifier; never provisioned on demand
    pub key_id: String,
    /// Algorithm identifier
    pub algorithm: String,
    /// Additional authenticated data given at encryption
    pub additional_data: Option<Vec<u8>>,
    /// Correlation and cancellation
    pub context: RequestContext,
}

impl DecryptionRequest {
    /// Build a decryption request from an encryption result.
    #[must_use]
    pub fn from_result(result: &EncryptionResult) -> Self {
        Self {
            ciphertext: result.ciphertext.clone(),
            iv: result.iv.clone(),
            auth_tag: result.auth_tag.clone(),
            key_id: result.key_id.clone(),
            algorithm: result.algorithm.clone(),
            additional_data: result.additional_data.clone(),
            context: RequestContext::new(),
        }
    }

    /// Replace the request context.
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// Request to sign a message.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    /// Message bytes
    pub data: Vec<u8>,
    /// Signing key identifier; provisioned on first use
    pub key_id: String,
    /// Algorithm identifier; the provider default when `None`
    pub algorithm: Option<String>,
    /// Correlation and cancellation
    pub context: RequestContext,
}

impl SignatureRequest {
    /// Create a request using the provider's default signing algorithm.
    #[must_use]
    pub fn new(key_id: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            key_id: key_id.into(),
            algorithm: None,
            context: RequestContext::new(),
        }
    }

    /// Request a specific algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    /// Replace the request context.
    #[must_use]
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}

/// Output of a signing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResult {
    /// Signature or MAC bytes
    pub signature: Vec<u8>,
    /// Resolved signing key identifier
    pub key_id: String,
    /// Resolved algorithm identifier
    pub algorithm: String,
}

/// Request to verify a signature.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    /// Message bytes
    pub data: Vec<u8>,
    /// Signature to check
    pub signature: Vec<u8>,
    /// Signing key identifier; never provisioned on demand
    pub key_id: String,
    /// Algorithm identifier
    pub algorithm: String,
    /// Correlation and cancellation
    pub context: RequestContext,
}

impl VerificationRequest {
    /// Build a verification request for `data` from a signing result.
    #[must_use]
    pub fn from_result(data: impl Into<Vec<u8>>, result: &SignatureResult) -> Self {
        Self {
            data: data.into(),
            signature: result.signature.clone(),
            key_id: result.key_id.clone(),
            algorithm: result.algorithm.clone(),
            context: RequestContext::new(),
        }
    }
}

/// What a key is for. Encryption and signing keys live in separate namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    /// Symmetric encryption key
    Encryption,
    /// MAC key or signing seed
    Signing,
}

impl KeyPurpose {
    /// The algorithm family keys of this purpose serve.
    #[must_use]
    pub const fn algorithm_kind(self) -> AlgorithmKind {
        match self {
            Self::Encryption => AlgorithmKind::Encryption,
            Self::Signing => AlgorithmKind::Signature,
        }
    }
}

/// Descriptive data about a stored key. Never contains key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// External identifier, stable across rotations
    pub key_id: String,
    /// Key namespace
    pub purpose: KeyPurpose,
    /// Algorithm the key was generated for, if one was named
    pub algorithm: Option<String>,
    /// Starts at 1, incremented on every rotation
    pub version: u32,
    /// When the identifier was first provisioned
    pub created_at: DateTime<Utc>,
    /// When the material was last replaced
    pub rotated_at: Option<DateTime<Utc>>,
}

/// Request to generate a new key.
#[derive(Debug, Clone)]
pub struct KeyGenerationRequest {
    /// Caller-chosen identifier; a random one is assigned when `None`
    pub key_id: Option<String>,
    /// Key namespace
    pub purpose: KeyPurpose,
    /// Algorithm the key is intended for
    pub algorithm: Option<String>,
    /// Correlation and cancellation
    pub context: RequestContext,
}

impl KeyGenerationRequest {
    /// Create a request for a key of the given purpose.
    #[must_use]
    pub fn new(purpose: KeyPurpose) -> Self {
        Self {
            key_id: None,
            purpose,
            algorithm: None,
            context: RequestContext::new(),
        }
    }

    /// Choose the identifier.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Name the intended algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }
}

/// Request addressing an existing key.
#[derive(Debug, Clone)]
pub struct KeyRequest {
    /// Key identifier
    pub key_id: String,
    /// Key namespace
    pub purpose: KeyPurpose,
    /// Correlation and cancellation
    pub context: RequestContext,
}

impl KeyRequest {
    /// Address an existing key.
    #[must_use]
    pub fn new(key_id: impl Into<String>, purpose: KeyPurpose) -> Self {
        Self {
            key_id: key_id.into(),
            purpose,
            context: RequestContext::new(),
        }
    }
}

/// Self-reported provider health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Reporting provider
    pub provider: String,
    /// Whether the provider considers itself usable
    pub healthy: bool,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
    /// Free-form detail
    pub details: Option<String>,
}

impl HealthStatus {
    /// A healthy report.
    #[must_use]
    pub fn healthy(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: true,
            checked_at: Utc::now(),
            details: None,
        }
    }

    /// An unhealthy report with a reason.
    #[must_use]
    pub fn unhealthy(provider: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            healthy: false,
            checked_at: Utc::now(),
            details: Some(details.into()),
        }
    }
}
