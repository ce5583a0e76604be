use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::audit::{AuditEvent, AuditSink};
use crate::context::RequestContext;
use crate::error::{CryptoError, CryptoResult};
use crate::models::{
    DecryptionRequest, EncryptionRequest, EncryptionResult, KeyGenerationRequest, KeyMetadata,
    KeyRequest, OperationType, SignatureRequest, SignatureResult, VerificationRequest,
};
use crate::provider::{CryptoOperations, KeyManagement, SignatureOperations};

/// Emits one audit event per call attempt.
///
/// Successful attempts record the resolved key and algorithm from the
/// result; failed attempts record what the request asked for. Policy
/// rejections are not audited.
///
/// A sink failure after a successful operation is returned as
/// `CryptoError::AuditSink`. After a failed operation the original error is
/// returned and the sink failure is logged.
pub struct AuditLayer<I: ?Sized> {
    inner: Arc<I>,
    sink: Arc<dyn AuditSink>,
    provider: String,
}

impl<I: ?Sized> AuditLayer<I> {
    /// Wrap `inner`, reporting events for `provider` to `sink`.
    #[must_use]
    pub fn new(inner: Arc<I>, sink: Arc<dyn AuditSink>, provider: impl Into<String>) -> Self {
        Self {
            inner,
            sink,
            provider: provider.into(),
        }
    }

    fn failure(
        &self,
        operation: OperationType,
        key_id: &str,
        algorithm: Option<&str>,
        context: &RequestContext,
        err: &CryptoError,
    ) -> AuditEvent {
        AuditEvent::failure(operation, &self.provider, key_id, algorithm, context, err)
    }

    fn success(
        &self,
        operation: OperationType,
        key_id: &str,
        algorithm: Option<&str>,
        context: &RequestContext,
    ) -> AuditEvent {
        AuditEvent::success(operation, &self.provider, key_id, algorithm, context)
    }

    async fn record<T: Send>(&self, event: AuditEvent, outcome: CryptoResult<T>) -> CryptoResult<T> {
        if matches!(outcome, Err(CryptoError::PolicyViolation(_))) {
            return outcome;
        }

        match (self.sink.record(&event).await, outcome) {
            (Ok(()), outcome) => outcome,
            (Err(sink_err), Ok(_)) => {
                error!(
                    sink = %sink_err.sink,
                    operation = %event.operation,
                    correlation_id = %event.correlation_id,
                    error = %sink_err,
                    "Audit sink failed after successful operation"
                );
                Err(sink_err.into())
            }
            (Err(sink_err), Err(err)) => {
                error!(
                    sink = %sink_err.sink,
                    operation = %event.operation,
                    correlation_id = %event.correlation_id,
                    error = %sink_err,
                    operation_error = %err,
                    "Audit sink failed after failed operation"
                );
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<I: CryptoOperations + ?Sized> CryptoOperations for AuditLayer<I> {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        let outcome = self.inner.encrypt(request).await;
        let event = match &outcome {
            Ok(result) => self.success(
                OperationType::Encrypt,
                &result.key_id,
                Some(&result.algorithm),
                &request.context,
            ),
            Err(err) => self.failure(
                OperationType::Encrypt,
                &request.key_id,
                request.algorithm.as_deref(),
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        let outcome = self.inner.decrypt(request).await;
        let event = match &outcome {
            Ok(_) => self.success(
                OperationType::Decrypt,
                &request.key_id,
                Some(&request.algorithm),
                &request.context,
            ),
            Err(err) => self.failure(
                OperationType::Decrypt,
                &request.key_id,
                Some(&request.algorithm),
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }
}

#[async_trait]
impl<I: SignatureOperations + ?Sized> SignatureOperations for AuditLayer<I> {
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        let outcome = self.inner.sign(request).await;
        let event = match &outcome {
            Ok(result) => self.success(
                OperationType::Sign,
                &result.key_id,
                Some(&result.algorithm),
                &request.context,
            ),
            Err(err) => self.failure(
                OperationType::Sign,
                &request.key_id,
                request.algorithm.as_deref(),
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }

    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        let outcome = self.inner.verify(request).await;
        let event = match &outcome {
            Ok(valid) => {
                let mut event = self.success(
                    OperationType::Verify,
                    &request.key_id,
                    Some(&request.algorithm),
                    &request.context,
                );
                event.metadata.insert("valid".to_string(), valid.to_string());
                event
            }
            Err(err) => self.failure(
                OperationType::Verify,
                &request.key_id,
                Some(&request.algorithm),
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }
}

#[async_trait]
impl<I: KeyManagement + ?Sized> KeyManagement for AuditLayer<I> {
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        let outcome = self.inner.generate_key(request).await;
        let event = match &outcome {
            Ok(metadata) => self.success(
                OperationType::GenerateKey,
                &metadata.key_id,
                metadata.algorithm.as_deref(),
                &request.context,
            ),
            Err(err) => self.failure(
                OperationType::GenerateKey,
                request.key_id.as_deref().unwrap_or_default(),
                request.algorithm.as_deref(),
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }

    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        let outcome = self.inner.rotate_key(request).await;
        let event = match &outcome {
            Ok(metadata) => {
                let mut event = self.success(
                    OperationType::RotateKey,
                    &metadata.key_id,
                    metadata.algorithm.as_deref(),
                    &request.context,
                );
                event
                    .metadata
                    .insert("version".to_string(), metadata.version.to_string());
                event
            }
            Err(err) => self.failure(
                OperationType::RotateKey,
                &request.key_id,
                None,
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        let outcome = self.inner.describe_key(request).await;
        let event = match &outcome {
            Ok(metadata) => self.success(
                OperationType::DescribeKey,
                &metadata.key_id,
                metadata.algorithm.as_deref(),
                &request.context,
            ),
            Err(err) => self.failure(
                OperationType::DescribeKey,
                &request.key_id,
                None,
                &request.context,
                err,
            ),
        };
        self.record(event, outcome).await
    }
}
