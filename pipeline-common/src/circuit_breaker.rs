//! Circuit breaker implementation for resilience.
//!
//! This module provides a circuit breaker state machine that stops calling an
//! unhealthy dependency for a cooldown period. One breaker guards exactly one
//! logical backend; sharing an instance across backends mixes their failure
//! streaks.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, trial calls are allowed to test recovery
    HalfOpen,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open state to close the circuit
    pub success_threshold: u32,
    /// Time to wait before an open circuit admits a trial call
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Create a new config with custom reset timeout.
    #[must_use]
    pub const fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

/// Rejection returned while the circuit is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerOpen {
    /// Time left until the next trial call is admitted
    pub retry_after: Duration,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    next_attempt: Option<Instant>,
}

impl BreakerState {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            next_attempt: None,
        }
    }

    fn trip(&mut self, reset_timeout: Duration) {
        self.state = CircuitState::Open;
        self.consecutive_successes = 0;
        self.next_attempt = Some(Instant::now() + reset_timeout);
    }
}

/// Circuit breaker for protecting a backend.
///
/// Implements the circuit breaker pattern with three states:
/// - Closed: Normal operation, calls are allowed
/// - Open: Failure threshold reached, calls fail fast until `next_attempt`
/// - Half-Open: Probing, any failure re-opens, enough successes close
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Ask permission to call the guarded backend.
    ///
    /// An open circuit whose `next_attempt` has passed moves to half-open and
    /// admits the call.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerOpen`] while the circuit is open and the reset
    /// timeout has not elapsed.
    pub async fn try_acquire(&self) -> Result<(), BreakerOpen> {
        let mut s = self.state.lock().await;
        match s.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let now = Instant::now();
                match s.next_attempt {
                    Some(next) if now < next => Err(BreakerOpen {
                        retry_after: next - now,
                    }),
                    _ => {
                        s.state = CircuitState::HalfOpen;
                        s.consecutive_successes = 0;
                        info!(circuit = %self.name, "Circuit transitioning to half-open");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Record a successful call.
    ///
    /// In closed state this clears the failure streak. In half-open state,
    /// `success_threshold` consecutive successes close the circuit.
    pub async fn record_success(&self) {
        let mut s = self.state.lock().await;
        match s.state {
            CircuitState::Closed => {
                s.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                s.consecutive_successes += 1;
                debug!(
                    circuit = %self.name,
                    successes = s.consecutive_successes,
                    "Half-open trial call succeeded"
                );
                if s.consecutive_successes >= self.config.success_threshold {
                    *s = BreakerState::new();
                    info!(circuit = %self.name, "Circuit closed after recovery");
                }
            }
            // Calls are not admitted while open; a late result is ignored.
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    ///
    /// In closed state `failure_threshold` consecutive failures open the
    /// circuit. Any failure while half-open re-opens it immediately.
    pub async fn record_failure(&self) {
        let mut s = self.state.lock().await;
        match s.state {
            CircuitState::Closed => {
                s.consecutive_failures += 1;
                if s.consecutive_failures >= self.config.failure_threshold {
                    s.trip(self.config.reset_timeout);
                    warn!(
                        circuit = %self.name,
                        failures = s.consecutive_failures,
                        "Circuit opened due to failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                s.consecutive_failures += 1;
                s.trip(self.config.reset_timeout);
                warn!(circuit = %self.name, "Circuit re-opened from half-open");
            }
            CircuitState::Open => {}
        }
    }

    /// Get the current circuit state.
    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Get the current consecutive failure count.
    pub async fn failure_count(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }

    /// Get the current consecutive success count.
    pub async fn success_count(&self) -> u32 {
        self.state.lock().await.consecutive_successes
    }

    /// Instant at which an open circuit will admit its next trial call.
    pub async fn next_attempt(&self) -> Option<Instant> {
        self.state.lock().await.next_attempt
    }

    /// Reset the circuit breaker to closed state.
    pub async fn reset(&self) {
        *self.state.lock().await = BreakerState::new();
        info!(circuit = %self.name, "Circuit manually reset");
    }

    /// Name used in logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the breaker configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}
