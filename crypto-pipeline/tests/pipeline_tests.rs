//! Integration tests for decorated provider compositions.

use std::sync::Arc;
use std::time::Duration;

use crypto_pipeline::{
    BaseProvider, CancellationSignal, CircuitBreakerHealthMonitoring, CryptoError,
    CryptoOperations, CryptoProvider, DecoratorSet, DecryptionRequest, EncryptionRequest,
    EncryptionResult, HealthMonitoring, KeyManagement, KeyPurpose, KeyRequest, ProviderFactory,
    RequestContext, SignatureOperations, SignatureRequest, VerificationRequest,
};
use pipeline_common::CircuitState;
use test_utils::{
    breaker_config, recorded_deps, sample_pipeline_config, tenant_policy, FailingAuditSink,
    FlakyProvider, RecordingAuditSink, RecordingMetricsCollector, ScriptedHealthMonitor,
};

fn unknown_key_request(key_id: &str) -> DecryptionRequest {
    DecryptionRequest::from_result(&EncryptionResult {
        ciphertext: vec![1, 2, 3],
        iv: vec![0; 12],
        auth_tag: vec![0; 16],
        key_id: key_id.to_string(),
        algorithm: "AES-256-GCM".to_string(),
        additional_data: None,
    })
}

#[tokio::test]
async fn test_retries_are_audited_individually_and_measured_once() {
    let flaky = Arc::new(FlakyProvider::new(2));
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let provider = ProviderFactory::build(
        flaky.clone(),
        &DecoratorSet::all(),
        &recorded_deps(sink.clone(), metrics.clone()),
    );

    let context = RequestContext::with_correlation_id("corr-1");
    let result = provider
        .encrypt(&EncryptionRequest::new("orders", b"payload".to_vec()).with_context(context))
        .await
        .unwrap();
    assert_eq!(result.key_id, "orders");
    assert_eq!(flaky.calls(), 3);

    let events = sink.events().await;
    assert_eq!(events.len(), 3);
    assert_eq!(
        events.iter().map(|e| e.success).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert!(events.iter().all(|e| e.correlation_id == "corr-1"));
    assert_eq!(
        events[0].metadata.get("error_code").map(String::as_str),
        Some("UNAVAILABLE")
    );

    let latencies = metrics.latencies();
    assert_eq!(latencies.len(), 1);
    assert_eq!(latencies[0].0, "encrypt");
    let counters = metrics.counters();
    assert_eq!(counters.len(), 1);
    assert_eq!(counters[0].label("status"), Some("success"));
}

#[tokio::test]
async fn test_policy_rejection_leaves_no_trace() {
    let flaky = Arc::new(FlakyProvider::new(0));
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let deps = recorded_deps(sink.clone(), metrics.clone()).with_policy(tenant_policy(["tenant-a"]));
    let provider = ProviderFactory::build(flaky.clone(), &DecoratorSet::all(), &deps);

    let err = provider
        .encrypt(&EncryptionRequest::new("tenant-b", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::PolicyViolation(_)));

    assert_eq!(flaky.calls(), 0);
    assert_eq!(sink.count().await, 0);
    assert!(metrics.latencies().is_empty());
    assert!(metrics.counters().is_empty());

    provider
        .encrypt(&EncryptionRequest::new("tenant-a", b"x".to_vec()))
        .await
        .unwrap();
    assert_eq!(flaky.calls(), 1);
    assert_eq!(sink.count().await, 1);
}

#[tokio::test]
async fn test_policy_applies_to_signatures() {
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let deps = recorded_deps(sink, metrics).with_policy(tenant_policy(["signer"]));
    let provider = ProviderFactory::build(
        Arc::new(BaseProvider::with_defaults()),
        &DecoratorSet::all(),
        &deps,
    );

    let signed = provider
        .sign(&SignatureRequest::new("signer", b"msg".to_vec()))
        .await
        .unwrap();
    assert!(provider
        .verify(&VerificationRequest::from_result(b"msg".to_vec(), &signed))
        .await
        .unwrap());

    assert!(matches!(
        provider
            .sign(&SignatureRequest::new("intruder", b"msg".to_vec()))
            .await,
        Err(CryptoError::PolicyViolation(_))
    ));
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let flaky = Arc::new(FlakyProvider::failing_with(
        5,
        CryptoError::InvalidInput("bad request".to_string()),
    ));
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let provider = ProviderFactory::build(
        flaky.clone(),
        &DecoratorSet::all(),
        &recorded_deps(sink.clone(), metrics.clone()),
    );

    let err = provider
        .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::InvalidInput(_)));
    assert_eq!(flaky.calls(), 1);
    assert_eq!(sink.count().await, 1);

    let counters = metrics.counters();
    assert_eq!(counters[0].label("status"), Some("error"));
    assert_eq!(counters[0].label("error_code"), Some("INVALID_INPUT"));
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_error() {
    let flaky = Arc::new(FlakyProvider::new(10));
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let provider = ProviderFactory::build(
        flaky.clone(),
        &DecoratorSet::all(),
        &recorded_deps(sink.clone(), metrics.clone()),
    );

    let err = provider
        .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::Unavailable(_)));
    assert_eq!(flaky.calls(), 3);
    assert_eq!(sink.count().await, 3);
    assert_eq!(metrics.latencies().len(), 1);
}

#[tokio::test]
async fn test_audit_sink_failure_fails_successful_operation_once() {
    let sink = Arc::new(FailingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let base = Arc::new(BaseProvider::with_defaults());
    let provider = ProviderFactory::build(
        base,
        &DecoratorSet::all(),
        &recorded_deps(sink.clone(), metrics),
    );

    let err = provider
        .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::AuditSink(_)));
    assert_eq!(sink.attempts(), 1);

    let err = provider.decrypt(&unknown_key_request("missing")).await.unwrap_err();
    assert_eq!(err, CryptoError::key_not_found("missing"));
    assert_eq!(sink.attempts(), 2);
}

#[tokio::test]
async fn test_decrypt_never_provisions_a_key() {
    let base = Arc::new(BaseProvider::with_defaults());
    let provider = ProviderFactory::build(base.clone(), &DecoratorSet::all(), &Default::default());

    let err = provider.decrypt(&unknown_key_request("ghost")).await.unwrap_err();
    assert_eq!(err, CryptoError::key_not_found("ghost"));
    let err = provider
        .describe_key(&KeyRequest::new("ghost", KeyPurpose::Encryption))
        .await
        .unwrap_err();
    assert_eq!(err, CryptoError::key_not_found("ghost"));

    assert!(!base.has_key(KeyPurpose::Encryption, "ghost").await);
    assert_eq!(base.key_count(KeyPurpose::Encryption).await, 0);
}

#[tokio::test]
async fn test_cancelled_request_does_no_work() {
    let base = Arc::new(BaseProvider::with_defaults());
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let provider = ProviderFactory::build(
        base.clone(),
        &DecoratorSet::all(),
        &recorded_deps(sink.clone(), metrics),
    );

    let signal = CancellationSignal::new();
    signal.cancel();
    let context = RequestContext::new().with_cancellation(signal);

    let err = provider
        .encrypt(&EncryptionRequest::new("k", b"x".to_vec()).with_context(context))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::Cancelled(_)));
    assert!(!base.has_key(KeyPurpose::Encryption, "k").await);
    assert_eq!(sink.count().await, 1);
}

#[tokio::test]
async fn test_rotation_is_a_hard_cutover() {
    let provider = ProviderFactory::from_config(&sample_pipeline_config(), Default::default()).unwrap();

    let sealed = provider
        .encrypt(&EncryptionRequest::new("k", b"before".to_vec()))
        .await
        .unwrap();
    let metadata = provider
        .rotate_key(&KeyRequest::new("k", KeyPurpose::Encryption))
        .await
        .unwrap();
    assert_eq!(metadata.version, 2);
    assert!(metadata.rotated_at.is_some());

    let err = provider
        .decrypt(&DecryptionRequest::from_result(&sealed))
        .await
        .unwrap_err();
    assert!(matches!(err, CryptoError::Decryption(_)));

    let resealed = provider
        .encrypt(&EncryptionRequest::new("k", b"after".to_vec()))
        .await
        .unwrap();
    assert_eq!(
        provider
            .decrypt(&DecryptionRequest::from_result(&resealed))
            .await
            .unwrap(),
        b"after"
    );
}

#[tokio::test]
async fn test_health_breaker_lifecycle() {
    let monitor = Arc::new(ScriptedHealthMonitor::new().then_unhealthy(2).then_error(1));
    let guarded = CircuitBreakerHealthMonitoring::new(
        monitor.clone(),
        "hsm",
        breaker_config(3, 2, Duration::from_millis(50)),
    );

    assert!(!guarded.health_check().await.unwrap().healthy);
    assert!(!guarded.health_check().await.unwrap().healthy);
    assert!(guarded.health_check().await.is_err());
    assert_eq!(guarded.state().await, CircuitState::Open);

    let err = guarded.health_check().await.unwrap_err();
    assert!(matches!(err, CryptoError::CircuitBreakerOpen { ref provider, .. } if provider == "hsm"));
    assert_eq!(monitor.calls(), 3);

    tokio::time::sleep(Duration::from_millis(70)).await;
    assert!(guarded.health_check().await.unwrap().healthy);
    assert_eq!(guarded.state().await, CircuitState::HalfOpen);
    assert!(guarded.health_check().await.unwrap().healthy);
    assert_eq!(guarded.state().await, CircuitState::Closed);
    assert_eq!(monitor.calls(), 5);
}

#[tokio::test]
async fn test_factory_composes_named_provider() {
    let provider = ProviderFactory::from_config(&sample_pipeline_config(), Default::default()).unwrap();
    assert_eq!(provider.name(), "test-provider");

    let status = provider.health_check().await.unwrap();
    assert!(status.healthy);
    assert_eq!(status.provider, "test-provider");

    let dyn_provider: Arc<dyn CryptoProvider> = provider;
    assert_eq!(dyn_provider.name(), "test-provider");
}

#[tokio::test]
async fn test_decorator_set_disables_layers() {
    let flaky = Arc::new(FlakyProvider::new(1));
    let sink = Arc::new(RecordingAuditSink::new());
    let metrics = Arc::new(RecordingMetricsCollector::new());
    let provider = ProviderFactory::build(
        flaky.clone(),
        &DecoratorSet::parse_list("audit,metrics"),
        &recorded_deps(sink.clone(), metrics.clone()),
    );

    assert!(provider
        .encrypt(&EncryptionRequest::new("k", b"x".to_vec()))
        .await
        .is_err());
    assert_eq!(flaky.calls(), 1);
    assert_eq!(sink.count().await, 1);
    assert_eq!(metrics.counters()[0].label("error_code"), Some("UNAVAILABLE"));
}
