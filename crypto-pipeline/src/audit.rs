//! Audit events and the sinks that record them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::context::RequestContext;
use crate::error::CryptoError;
use crate::models::OperationType;

/// Target used for audit records emitted through `tracing`.
pub const AUDIT_TARGET: &str = "crypto_pipeline::audit";

/// Immutable record of one operation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Operation attempted
    pub operation: OperationType,
    /// Provider that handled the attempt
    pub provider: String,
    /// Resolved key on success, requested key on failure
    pub key_id: String,
    /// Resolved algorithm on success, requested algorithm on failure
    pub algorithm: Option<String>,
    /// When the attempt finished
    pub timestamp: DateTime<Utc>,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Correlation identifier of the logical request
    pub correlation_id: String,
    /// Extra fields such as the error code of a failed attempt
    pub metadata: BTreeMap<String, String>,
}

impl AuditEvent {
    /// Event for a successful attempt.
    #[must_use]
    pub fn success(
        operation: OperationType,
        provider: &str,
        key_id: &str,
        algorithm: Option<&str>,
        context: &RequestContext,
    ) -> Self {
        Self {
            operation,
            provider: provider.to_string(),
            key_id: key_id.to_string(),
            algorithm: algorithm.map(str::to_string),
            timestamp: Utc::now(),
            success: true,
            correlation_id: context.correlation_id.clone(),
            metadata: BTreeMap::new(),
        }
    }

    /// Event for a failed attempt, recording the error code and message.
    #[must_use]
    pub fn failure(
        operation: OperationType,
        provider: &str,
        key_id: &str,
        algorithm: Option<&str>,
        context: &RequestContext,
        error: &CryptoError,
    ) -> Self {
        let mut event = Self::success(operation, provider, key_id, algorithm, context);
        event.success = false;
        event
            .metadata
            .insert("error_code".to_string(), error.kind().code().to_string());
        event.metadata.insert("error".to_string(), error.to_string());
        event
    }
}

/// A sink failed to record an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{sink}: {message}")]
pub struct AuditSinkError {
    /// Name of the failing sink
    pub sink: String,
    /// What went wrong
    pub message: String,
}

impl AuditSinkError {
    /// Create a sink error.
    #[must_use]
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

impl From<AuditSinkError> for CryptoError {
    fn from(err: AuditSinkError) -> Self {
        Self::AuditSink(err.to_string())
    }
}

/// Destination for audit events. Called once per operation attempt.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Sink name used in error reports.
    fn name(&self) -> &str;

    /// Record one event.
    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError>;
}

/// Writes events as JSON through `tracing` under [`AUDIT_TARGET`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let json = serde_json::to_string(event)
            .map_err(|e| AuditSinkError::new(self.name(), e.to_string()))?;
        info!(
            target: AUDIT_TARGET,
            operation = %event.operation,
            success = event.success,
            correlation_id = %event.correlation_id,
            event = %json,
            "audit"
        );
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn record(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
        Ok(())
    }
}

/// Fans each event out to every sink.
///
/// All sinks are called even after one fails; failures are combined into a
/// single error listing each failed sink.
#[derive(Clone, Default)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    /// Create a composite over the given sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }

    /// Add a sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for CompositeAuditSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("CompositeAuditSink").field("sinks", &names).finish()
    }
}

#[async_trait]
impl AuditSink for CompositeAuditSink {
    fn name(&self) -> &str {
        "composite"
    }

    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(err) = sink.record(event).await {
                failures.push(err.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AuditSinkError::new(self.name(), failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    #[async_trait]
    impl AuditSink for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn record(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken(&'static str);

    #[async_trait]
    impl AuditSink for Broken {
        fn name(&self) -> &str {
            self.0
        }

        async fn record(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
            Err(AuditSinkError::new(self.0, "unreachable"))
        }
    }

    fn event() -> AuditEvent {
        AuditEvent::success(
            OperationType::Encrypt,
            "local",
            "k",
            Some("AES-256-GCM"),
            &RequestContext::with_correlation_id("c-1"),
        )
    }

    #[test]
    fn test_failure_event_carries_error_code() {
        let event = AuditEvent::failure(
            OperationType::Decrypt,
            "local",
            "k",
            None,
            &RequestContext::new(),
            &CryptoError::key_not_found("k"),
        );
        assert!(!event.success);
        assert_eq!(event.metadata.get("error_code").map(String::as_str), Some("KEY_NOT_FOUND"));
    }

    #[test]
    fn test_event_serializes_as_json() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["operation"], "encrypt");
        assert_eq!(json["correlation_id"], "c-1");
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn test_composite_calls_every_sink_and_aggregates() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let composite = CompositeAuditSink::default()
            .with_sink(Arc::new(Broken("first")))
            .with_sink(counting.clone())
            .with_sink(Arc::new(Broken("second")));

        let err = composite.record(&event()).await.unwrap_err();
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert!(err.message.contains("first"));
        assert!(err.message.contains("second"));
        assert!(matches!(CryptoError::from(err), CryptoError::AuditSink(_)));
    }

    #[tokio::test]
    async fn test_builtin_sinks_succeed() {
        assert!(TracingAuditSink.record(&event()).await.is_ok());
        assert!(NoopAuditSink.record(&event()).await.is_ok());
    }
}
