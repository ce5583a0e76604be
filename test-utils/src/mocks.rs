//! Test doubles for pipeline collaborators.
//!
//! Recording doubles keep everything they receive so tests can assert on
//! exact counts and contents. Scripted doubles fail on demand.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use crypto_pipeline::{
    AuditEvent, AuditSink, AuditSinkError, BaseProvider, CryptoError, CryptoOperations,
    CryptoProvider, CryptoResult, DecryptionRequest, EncryptionRequest, EncryptionResult,
    HealthMonitoring, HealthStatus, KeyGenerationRequest, KeyManagement, KeyMetadata, KeyRequest,
    MetricsCollector, SignatureOperations, SignatureRequest, SignatureResult, VerificationRequest,
};
use tokio::sync::RwLock;

/// Audit sink that keeps every event it is given.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events in arrival order.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Number of recorded events.
    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Drop all recorded events.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn record(&self, event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Audit sink that rejects every event.
#[derive(Debug, Default)]
pub struct FailingAuditSink {
    attempts: AtomicU32,
}

impl FailingAuditSink {
    /// Create a failing sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events offered to the sink.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditSink for FailingAuditSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn record(&self, _event: &AuditEvent) -> Result<(), AuditSinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AuditSinkError::new("failing", "sink offline"))
    }
}

/// One counter increment seen by [`RecordingMetricsCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCounter {
    /// Operation label
    pub operation: String,
    /// Extra labels in the order given
    pub labels: Vec<(String, String)>,
}

impl RecordedCounter {
    /// Value of a label, if present.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Metrics collector that keeps every sample it is given.
#[derive(Debug, Default)]
pub struct RecordingMetricsCollector {
    latencies: Mutex<Vec<(String, Duration)>>,
    counters: Mutex<Vec<RecordedCounter>>,
}

impl RecordingMetricsCollector {
    /// Create an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded latency samples as `(operation, latency)`.
    #[must_use]
    pub fn latencies(&self) -> Vec<(String, Duration)> {
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded counter increments.
    #[must_use]
    pub fn counters(&self) -> Vec<RecordedCounter> {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MetricsCollector for RecordingMetricsCollector {
    fn record_latency(&self, operation: &str, latency: Duration) {
        self.latencies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((operation.to_string(), latency));
    }

    fn increment_counter(&self, operation: &str, labels: &[(&str, &str)]) {
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCounter {
                operation: operation.to_string(),
                labels: labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            });
    }
}

/// Provider that fails a fixed number of calls before delegating.
///
/// Every operation shares one failure budget and one call counter, so a
/// test can tell how many attempts reached the bottom of the chain.
#[derive(Debug)]
pub struct FlakyProvider {
    inner: BaseProvider,
    failures_remaining: AtomicU32,
    calls: AtomicU32,
    error: CryptoError,
}

impl FlakyProvider {
    /// Fail the first `failures` calls with `Unavailable`.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self::failing_with(failures, CryptoError::Unavailable("backend flapping".to_string()))
    }

    /// Fail the first `failures` calls with `error`.
    #[must_use]
    pub fn failing_with(failures: u32, error: CryptoError) -> Self {
        Self {
            inner: BaseProvider::with_defaults(),
            failures_remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            error,
        }
    }

    /// Calls that reached this provider, failed ones included.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The wrapped base provider.
    #[must_use]
    pub const fn inner(&self) -> &BaseProvider {
        &self.inner
    }

    fn attempt(&self) -> CryptoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let consumed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            Err(self.error.clone())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CryptoOperations for FlakyProvider {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        self.attempt()?;
        self.inner.encrypt(request).await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        self.attempt()?;
        self.inner.decrypt(request).await
    }
}

#[async_trait]
impl SignatureOperations for FlakyProvider {
    async fn sign(&self, request: &SignatureRequest) -> CryptoResult<SignatureResult> {
        self.attempt()?;
        self.inner.sign(request).await
    }

    async fn verify(&self, request: &VerificationRequest) -> CryptoResult<bool> {
        self.attempt()?;
        self.inner.verify(request).await
    }
}

#[async_trait]
impl KeyManagement for FlakyProvider {
    async fn generate_key(&self, request: &KeyGenerationRequest) -> CryptoResult<KeyMetadata> {
        self.attempt()?;
        self.inner.generate_key(request).await
    }

    async fn rotate_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.attempt()?;
        self.inner.rotate_key(request).await
    }

    async fn describe_key(&self, request: &KeyRequest) -> CryptoResult<KeyMetadata> {
        self.attempt()?;
        self.inner.describe_key(request).await
    }
}

#[async_trait]
impl HealthMonitoring for FlakyProvider {
    async fn health_check(&self) -> CryptoResult<HealthStatus> {
        self.inner.health_check().await
    }
}

impl CryptoProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }
}

/// Health monitor that replays scripted outcomes.
///
/// Once the script is exhausted every check reports healthy.
#[derive(Debug, Default)]
pub struct ScriptedHealthMonitor {
    script: Mutex<VecDeque<CryptoResult<HealthStatus>>>,
    calls: AtomicU32,
}

impl ScriptedHealthMonitor {
    /// Create a monitor that is always healthy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `count` unhealthy reports.
    #[must_use]
    pub fn then_unhealthy(self, count: usize) -> Self {
        self.push(count, || Ok(HealthStatus::unhealthy("scripted", "scripted outage")))
    }

    /// Queue `count` failed checks.
    #[must_use]
    pub fn then_error(self, count: usize) -> Self {
        self.push(count, || Err(CryptoError::Timeout("scripted timeout".to_string())))
    }

    /// Queue `count` healthy reports.
    #[must_use]
    pub fn then_healthy(self, count: usize) -> Self {
        self.push(count, || Ok(HealthStatus::healthy("scripted")))
    }

    /// Number of checks that reached this monitor.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn push(self, count: usize, outcome: impl Fn() -> CryptoResult<HealthStatus>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend((0..count).map(|_| outcome()));
        self
    }
}

#[async_trait]
impl HealthMonitoring for ScriptedHealthMonitor {
    async fn health_check(&self) -> CryptoResult<HealthStatus> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Ok(HealthStatus::healthy("scripted")))
    }
}

/// Provider that yields to the scheduler before every call.
///
/// Concurrent callers polled on one task all reach the provider before any
/// of them completes, which exposes check-then-act races above it.
#[derive(Debug)]
pub struct YieldingProvider {
    inner: BaseProvider,
    encrypt_calls: AtomicU32,
}

impl YieldingProvider {
    /// Create a provider over a default [`BaseProvider`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: BaseProvider::with_defaults(),
            encrypt_calls: AtomicU32::new(0),
        }
    }

    /// Encrypt calls started so far.
    #[must_use]
    pub fn encrypt_calls(&self) -> u32 {
        self.encrypt_calls.load(Ordering::SeqCst)
    }
}

impl Default for YieldingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CryptoOperations for YieldingProvider {
    async fn encrypt(&self, request: &EncryptionRequest) -> CryptoResult<EncryptionResult> {
        self.encrypt_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.encrypt(request).await
    }

    async fn decrypt(&self, request: &DecryptionRequest) -> CryptoResult<Vec<u8>> {
        tokio::task::yield_now().await;
        self.inner.decrypt(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_flaky_provider_recovers() {
        let provider = FlakyProvider::new(2);
        let request = EncryptionRequest::new("k", b"x".to_vec());

        assert!(provider.encrypt(&request).await.is_err());
        assert!(provider.encrypt(&request).await.is_err());
        assert!(provider.encrypt(&request).await.is_ok());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_scripted_health_replays_then_defaults() {
        let monitor = ScriptedHealthMonitor::new().then_unhealthy(1).then_error(1);

        assert!(!monitor.health_check().await.unwrap().healthy);
        assert!(monitor.health_check().await.is_err());
        assert!(monitor.health_check().await.unwrap().healthy);
        assert_eq!(monitor.calls(), 3);
    }

    #[tokio::test]
    async fn test_yielding_provider_counts_encrypts() {
        let provider = YieldingProvider::new();
        let result = provider
            .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
            .await
            .unwrap();

        assert_eq!(provider.encrypt_calls(), 1);
        assert_eq!(
            provider.decrypt(&DecryptionRequest::from_result(&result)).await.unwrap(),
            b"x"
        );
    }

    #[test]
    fn test_recording_collector_keeps_labels() {
        let collector = RecordingMetricsCollector::new();
        collector.increment_counter("encrypt", &[("status", "error"), ("error_code", "TIMEOUT")]);

        let counters = collector.counters();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].label("error_code"), Some("TIMEOUT"));
    }
}
