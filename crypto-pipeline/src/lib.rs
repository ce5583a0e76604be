//! Composable cryptographic provider pipeline.
//!
//! This crate provides:
//! - Capability traits for encryption, signing, key management and health
//! - A base provider backed by an algorithm registry and in-memory keys
//! - Policy, audit, retry and metrics decorators applied in a fixed order
//! - A circuit breaker guarding provider health checks
//! - A factory that assembles decorated providers from configuration
//! - Envelope encryption with a bounded, expiring data-key cache
//!
//! # Example
//!
//! ```no_run
//! use crypto_pipeline::{
//!     CryptoOperations, DecoratorDeps, DecryptionRequest, EncryptionRequest, PipelineConfig,
//!     ProviderFactory,
//! };
//!
//! # async fn run() -> crypto_pipeline::CryptoResult<()> {
//! let provider = ProviderFactory::from_config(&PipelineConfig::from_env(), DecoratorDeps::default())?;
//! let sealed = provider.encrypt(&EncryptionRequest::new("orders", b"secret".to_vec())).await?;
//! let plain = provider.decrypt(&DecryptionRequest::from_result(&sealed)).await?;
//! assert_eq!(plain, b"secret");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithms;
pub mod audit;
pub mod config;
pub mod context;
pub mod decorators;
pub mod envelope;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod provider;
pub mod registry;

pub use algorithms::{
    Aes256GcmStrategy, ChaCha20Poly1305Strategy, Ed25519Strategy, EncryptionStrategy,
    HmacSha256Strategy, SealedData, SignatureStrategy,
};
pub use audit::{AuditEvent, AuditSink, AuditSinkError, CompositeAuditSink, NoopAuditSink, TracingAuditSink};
pub use config::{ConfigValidationError, DecoratorSet, EnvelopeConfig, PipelineConfig};
pub use context::{CancellationSignal, RequestContext};
pub use decorators::{AuditLayer, CircuitBreakerHealthMonitoring, MetricsLayer, PolicyLayer, RetryLayer};
pub use envelope::{DataKey, EnvelopeEncrypter, EnvelopePayload};
pub use error::{CryptoError, CryptoResult, ErrorKind};
pub use factory::{DecoratorDeps, ProviderFactory};
pub use metrics::{MetricsCollector, NoopMetricsCollector, PrometheusMetricsCollector};
pub use models::*;
pub use policy::{PolicyChecker, PolicyContext, PolicyRule, RulePolicyChecker};
pub use provider::{
    BaseProvider, BaseProviderConfig, CryptoOperations, CryptoProvider, HealthMonitoring,
    KeyManagement, ProviderAdapter, SignatureOperations,
};
pub use registry::{AlgorithmRegistry, Strategy};
