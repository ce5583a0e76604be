use std::sync::Arc;

use async_trait::async_trait;
use pipeline_common::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use tracing::debug;

use crate::error::{CryptoError, CryptoResult};
use crate::models::HealthStatus;
use crate::provider::HealthMonitoring;

/// Gates a health check behind a circuit breaker.
///
/// Unhealthy reports and errors both count as failures. While the circuit
/// is open the inner check is not called and `CircuitBreakerOpen` is
/// returned. One instance guards one backend.
pub struct CircuitBreakerHealthMonitoring<I: ?Sized> {
    inner: Arc<I>,
    breaker: CircuitBreaker,
    provider: String,
}

impl<I: ?Sized> CircuitBreakerHealthMonitoring<I> {
    /// Wrap the health check of `provider`.
    #[must_use]
    pub fn new(inner: Arc<I>, provider: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let provider = provider.into();
        Self {
            inner,
            breaker: CircuitBreaker::new(format!("{provider}-health"), config),
            provider,
        }
    }

    /// Current breaker state.
    pub async fn state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// The underlying breaker, for inspection and manual reset.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<I: HealthMonitoring + ?Sized> HealthMonitoring for CircuitBreakerHealthMonitoring<I> {
    async fn health_check(&self) -> CryptoResult<HealthStatus> {
        if let Err(open) = self.breaker.try_acquire().await {
            debug!(provider = %self.provider, "Health check rejected by open circuit");
            return Err(CryptoError::CircuitBreakerOpen {
                provider: self.provider.clone(),
                retry_after_ms: u64::try_from(open.retry_after.as_millis()).unwrap_or(u64::MAX),
            });
        }

        let outcome = self.inner.health_check().await;
        match &outcome {
            Ok(status) if status.healthy => self.breaker.record_success().await,
            _ => self.breaker.record_failure().await,
        }
        outcome
    }
}
