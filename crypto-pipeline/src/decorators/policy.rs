use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{CryptoError, CryptoResult};
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, KeyGenerationRequest, KeyMetadata,
    KeyPurpose, KeyRequest, OperationType, SignatureRequest, SignatureResult, VerificationRequest,
};
use crate::policy::{PolicyChecker, PolicyContext};
use crate::provider::{CryptoOperations, KeyManagement, SignatureOperations};

/// Rejects disallowed requests before the inner layer is called.
pub struct PolicyLayer<I: ?Sized> {
    inner: Arc<I>,
    checker: Arc<dyn PolicyChecker>,
    key_metadata: Option<Arc<dyn KeyManagement>>,
}

impl<I: ?Sized> PolicyLayer<I> {
    /// Wrap `inner` with `checker`.
    #[must_use]
    pub fn new(inner: Arc<I>, checker: Arc<dyn PolicyChecker>) -> Self {
        Self {
            inner,
            checker,
            key_metadata: None,
        }
    }

    /// Resolve key creation times through `keys` for age-restricting rules.
    #[must_use]
    pub fn with_key_metadata(mut self, keys: Arc<dyn KeyManagement>) -> Self {
        self.key_metadata = Some(keys);
        self
    }

    async fn created_at(
        &self,
        key_id: &str,
        purpose: KeyPurpose,
        context: &RequestContext,
    ) -> CryptoResult<Option<DateTime<Utc>>> {
        let Some(keys) = self.key_metadata.as_ref() else {
            return Ok(None);
        };
        if !self.checker.requires_key_age() {
            return Ok(None);
        }
        let request = KeyRequest {
            key_id: key_id.to_string(),
            purpose,
            context: context.clone(),
        };
        match keys.describe_key(&request).await {
            Ok(metadata) => Ok(Some(metadata.created_at)),
            // An unknown key has no age yet
            Err(CryptoError::KeyNotFound(_)) => Ok(None),
            Err(e) => {
                warn!(key_id, error = %e, "Key age lookup failed");
                Err(e)
            }
        }
    }

    async fn enforce(
        &self,
        action: OperationType,
        key_id: &str,
        algorithm: Option<&str>,
        purpose: KeyPurpose,
        context: &RequestContext,
    ) -> CryptoResult<()> {
        let created_at = self.created_at(key_id, purpose, context).await?;
        debug!(%action, key_id, "Enforcing policy");
        self.checker.enforce(
            action,
            &PolicyContext {
                key_id: Some(key_id),
                algorithm,
                created_at,
            },
        )
    }
}

#[async_trait]
impl<I: CryptoOperations + ?Sized> CryptoOperations for PolicyLayer<I> {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        self.enforce(
            OperationType::Encrypt,
            &request.key_id,
            request.algorithm.as_deref(),
            KeyPurpose::Encryption,
            &request.context,
        )
        .await?;
        self.inner.encrypt(request).await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        self.enforce(
            OperationType::Decrypt,
            &request.key_id,
            Some(&request.algorithm),
            KeyPurpose::Encryption,
            &request.context,
        )
        .await?;
        self.inner.decrypt(request).await
    }
}

#[async_trait]
impl<I: SignatureOperations + ?Sized> SignatureOperations for PolicyLayer<I> {
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        self.enforce(
            OperationType::Sign,
            &request.key_id,
            request.algorithm.as_deref(),
            KeyPurpose::Signing,
            &request.context,
        )
        .await?;
        self.inner.sign(request).await
    }

    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        self.enforce(
            OperationType::Verify,
            &request.key_id,
            Some(&request.algorithm),
            KeyPurpose::Signing,
            &request.context,
        )
        .await?;
        self.inner.verify(request).await
    }
}

#[async_trait]
impl<I: KeyManagement + ?Sized> KeyManagement for PolicyLayer<I> {
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        self.checker.enforce(
            OperationType::GenerateKey,
            &PolicyContext {
                key_id: request.key_id.as_deref(),
                algorithm: request.algorithm.as_deref(),
                created_at: None,
            },
        )?;
        self.inner.generate_key(request).await
    }

    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        // Age limits exist to force rotation, so they never block it
        self.checker.enforce(
            OperationType::RotateKey,
            &PolicyContext {
                key_id: Some(&request.key_id),
                algorithm: None,
                created_at: None,
            },
        )?;
        self.inner.rotate_key(request).await
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.checker.enforce(
            OperationType::DescribeKey,
            &PolicyContext {
                key_id: Some(&request.key_id),
                algorithm: None,
                created_at: None,
            },
        )?;
        self.inner.describe_key(request).await
    }
}
