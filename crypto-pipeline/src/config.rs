//! Configuration for the pipeline.

use std::time::Duration;

use pipeline_common::{CircuitBreakerConfig, RetryConfig, TracingConfig, TryInitError};
use serde::Deserialize;
use tracing::warn;

use crate::algorithms::{AES_256_GCM, HMAC_SHA256};
use crate::audit::AUDIT_TARGET;

/// Prefix of every environment variable read by [`PipelineConfig::from_env`].
pub const ENV_PREFIX: &str = "CRYPTO_PIPELINE_";

/// Which decorators the factory applies. Order is fixed by the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DecoratorSet {
    /// Policy enforcement
    pub policy: bool,
    /// Audit events
    pub audit: bool,
    /// Retry with backoff
    pub retry: bool,
    /// Latency and outcome metrics
    pub metrics: bool,
    /// Circuit breaker around health checks
    pub circuit_breaker: bool,
}

impl Default for DecoratorSet {
    fn default() -> Self {
        Self::all()
    }
}

impl DecoratorSet {
    /// Every decorator enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            policy: true,
            audit: true,
            retry: true,
            metrics: true,
            circuit_breaker: true,
        }
    }

    /// No decorators.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            policy: false,
            audit: false,
            retry: false,
            metrics: false,
            circuit_breaker: false,
        }
    }

    /// Toggle policy enforcement.
    #[must_use]
    pub const fn with_policy(mut self, enabled: bool) -> Self {
        self.policy = enabled;
        self
    }

    /// Toggle audit.
    #[must_use]
    pub const fn with_audit(mut self, enabled: bool) -> Self {
        self.audit = enabled;
        self
    }

    /// Toggle retry.
    #[must_use]
    pub const fn with_retry(mut self, enabled: bool) -> Self {
        self.retry = enabled;
        self
    }

    /// Toggle metrics.
    #[must_use]
    pub const fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Toggle the health circuit breaker.
    #[must_use]
    pub const fn with_circuit_breaker(mut self, enabled: bool) -> Self {
        self.circuit_breaker = enabled;
        self
    }

    /// Parse a comma-separated list such as `policy,audit,metrics`.
    /// Unknown names are skipped with a warning.
    #[must_use]
    pub fn parse_list(list: &str) -> Self {
        list.split(',')
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .fold(Self::none(), |set, name| match name.as_str() {
                "policy" => set.with_policy(true),
                "audit" => set.with_audit(true),
                "retry" => set.with_retry(true),
                "metrics" => set.with_metrics(true),
                "circuit_breaker" | "circuit-breaker" => set.with_circuit_breaker(true),
                _ => {
                    warn!(decorator = %name, "Ignoring unknown decorator name");
                    set
                }
            })
    }
}

/// Envelope encrypter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Master key used when a call names none
    pub default_key_id: String,
    /// Lifetime of a cached data key
    pub cache_ttl: Duration,
    /// Maximum number of cached data keys
    pub cache_max_size: usize,
    /// Key version tag in effect at startup
    pub initial_key_version: String,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            default_key_id: "default".to_string(),
            cache_ttl: Duration::from_secs(300),
            cache_max_size: 100,
            initial_key_version: "v1".to_string(),
        }
    }
}

impl EnvelopeConfig {
    /// Set the default master key.
    #[must_use]
    pub fn with_default_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.default_key_id = key_id.into();
        self
    }

    /// Set the data key lifetime.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set the cache capacity.
    #[must_use]
    pub fn with_cache_max_size(mut self, max_size: usize) -> Self {
        self.cache_max_size = max_size;
        self
    }

    /// Set the initial key version tag.
    #[must_use]
    pub fn with_initial_key_version(mut self, version: impl Into<String>) -> Self {
        self.initial_key_version = version.into();
        self
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Provider name reported in audit events
    pub provider_name: String,
    /// Algorithm used when an encryption request names none
    pub default_encryption_algorithm: String,
    /// Algorithm used when a signature request names none
    pub default_signing_algorithm: String,
    /// Retry layer settings
    pub retry: RetryConfig,
    /// Health circuit breaker settings
    pub circuit_breaker: CircuitBreakerConfig,
    /// Envelope encrypter settings
    pub envelope: EnvelopeConfig,
    /// Decorators to apply
    pub decorators: DecoratorSet,
    /// Log output, with audit events on their own stream
    pub tracing: TracingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_name: "local".to_string(),
            default_encryption_algorithm: AES_256_GCM.to_string(),
            default_signing_algorithm: HMAC_SHA256.to_string(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            envelope: EnvelopeConfig::default(),
            decorators: DecoratorSet::default(),
            tracing: TracingConfig::default()
                .with_service_name("crypto-pipeline")
                .with_audit_target(AUDIT_TARGET),
        }
    }
}

impl PipelineConfig {
    /// Create config from `CRYPTO_PIPELINE_*` environment variables.
    ///
    /// Missing or unparsable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable source. `lookup` receives
    /// the full variable name, prefix included.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let millis = |suffix: &str| {
            var(suffix)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        let mut config = Self::default();

        if let Some(name) = var("PROVIDER_NAME") {
            config.provider_name = name;
        }
        if let Some(algorithm) = var("DEFAULT_ENCRYPTION_ALGORITHM") {
            config.default_encryption_algorithm = algorithm;
        }
        if let Some(algorithm) = var("DEFAULT_SIGNING_ALGORITHM") {
            config.default_signing_algorithm = algorithm;
        }

        if let Some(attempts) = var("RETRY_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            config.retry.max_attempts = attempts;
        }
        if let Some(delay) = millis("RETRY_INITIAL_DELAY_MS") {
            config.retry.initial_delay = delay;
        }
        if let Some(delay) = millis("RETRY_MAX_DELAY_MS") {
            config.retry.max_delay = delay;
        }
        if let Some(multiplier) = var("RETRY_MULTIPLIER").and_then(|v| v.parse().ok()) {
            config.retry.multiplier = multiplier;
        }

        if let Some(threshold) = var("CB_FAILURE_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(threshold) = var("CB_SUCCESS_THRESHOLD").and_then(|v| v.parse().ok()) {
            config.circuit_breaker.success_threshold = threshold;
        }
        if let Some(timeout) = millis("CB_RESET_TIMEOUT_MS") {
            config.circuit_breaker.reset_timeout = timeout;
        }

        if let Some(key_id) = var("ENVELOPE_KEY_ID") {
            config.envelope.default_key_id = key_id;
        }
        if let Some(secs) = var("ENVELOPE_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.envelope.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(size) = var("ENVELOPE_CACHE_MAX_SIZE").and_then(|v| v.parse().ok()) {
            config.envelope.cache_max_size = size;
        }
        if let Some(version) = var("ENVELOPE_KEY_VERSION") {
            config.envelope.initial_key_version = version;
        }

        if let Some(list) = var("DECORATORS") {
            config.decorators = DecoratorSet::parse_list(&list);
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.tracing.log_level = level;
        }
        if let Some(json) = var("LOG_JSON").and_then(|v| v.parse().ok()) {
            config.tracing.json_output = json;
        }
        if let Some(level) = var("AUDIT_LOG_LEVEL") {
            config.tracing.audit_level = level;
        }

        config
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.provider_name.trim().is_empty() {
            return Err(ConfigValidationError::MissingProviderName);
        }
        if self.default_encryption_algorithm.is_empty() || self.default_signing_algorithm.is_empty() {
            return Err(ConfigValidationError::MissingDefaultAlgorithm);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigValidationError::InvalidMaxAttempts);
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigValidationError::InvalidMultiplier(self.retry.multiplier));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigValidationError::InvalidFailureThreshold);
        }
        if self.circuit_breaker.success_threshold == 0 {
            return Err(ConfigValidationError::InvalidSuccessThreshold);
        }
        if self.envelope.default_key_id.is_empty() {
            return Err(ConfigValidationError::MissingEnvelopeKeyId);
        }
        if self.envelope.cache_max_size == 0 {
            return Err(ConfigValidationError::InvalidCacheSize);
        }
        if self.envelope.cache_ttl.is_zero() {
            return Err(ConfigValidationError::InvalidCacheTtl);
        }
        Ok(())
    }

    /// Set the provider name.
    #[must_use]
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
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

    /// Set retry settings.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set circuit breaker settings.
    #[must_use]
    pub fn with_circuit_breaker(mut self, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Set envelope settings.
    #[must_use]
    pub fn with_envelope(mut self, envelope: EnvelopeConfig) -> Self {
        self.envelope = envelope;
        self
    }

    /// Set the decorator set.
    #[must_use]
    pub fn with_decorators(mut self, decorators: DecoratorSet) -> Self {
        self.decorators = decorators;
        self
    }

    /// Set log output settings.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingConfig) -> Self {
        self.tracing = tracing;
        self
    }

    /// Install the global tracing subscriber described by `self.tracing`.
    ///
    /// # Errors
    ///
    /// Returns an error if a global subscriber is already installed.
    pub fn init_tracing(&self) -> Result<(), TryInitError> {
        pipeline_common::init_tracing(&self.tracing)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    /// Provider name is blank
    #[error("CRYPTO_PIPELINE_PROVIDER_NAME must not be empty")]
    MissingProviderName,

    /// A default algorithm is blank
    #[error("default encryption and signing algorithms must not be empty")]
    MissingDefaultAlgorithm,

    /// Retry would never run the operation
    #[error("CRYPTO_PIPELINE_RETRY_MAX_ATTEMPTS must be greater than 0")]
    InvalidMaxAttempts,

    /// Backoff would shrink between attempts
    #[error("CRYPTO_PIPELINE_RETRY_MULTIPLIER must be at least 1.0, got {0}")]
    InvalidMultiplier(f64),

    /// Breaker could never open
    #[error("CRYPTO_PIPELINE_CB_FAILURE_THRESHOLD must be greater than 0")]
    InvalidFailureThreshold,

    /// Breaker could never close
    #[error("CRYPTO_PIPELINE_CB_SUCCESS_THRESHOLD must be greater than 0")]
    InvalidSuccessThreshold,

    /// Envelope has no default master key
    #[error("CRYPTO_PIPELINE_ENVELOPE_KEY_ID must not be empty")]
    MissingEnvelopeKeyId,

    /// Cache could hold nothing
    #[error("CRYPTO_PIPELINE_ENVELOPE_CACHE_MAX_SIZE must be greater than 0")]
    InvalidCacheSize,

    /// Cached keys would expire immediately
    #[error("CRYPTO_PIPELINE_ENVELOPE_CACHE_TTL_SECS must be greater than 0")]
    InvalidCacheTtl,
}
