//! Retry policy implementation with exponential backoff.
//!
//! This module provides a configurable retry mechanism for handling
//! transient failures. Which failures count as transient is decided by the
//! error itself ([`Retryable::is_permanent`]) and by the code allow-list and
//! exclusion list carried in [`RetryConfig`].

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

/// Classification hooks an error type must expose to be retried.
pub trait Retryable {
    /// Stable machine-readable code, matched against the allow-list.
    fn code(&self) -> &str;

    /// Permanent errors are never retried, whatever the lists say.
    fn is_permanent(&self) -> bool;
}

/// Retry policy configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Whether to add up to 25% jitter to delays
    pub jitter: bool,
    /// When set, only these codes are retried
    pub retryable_codes: Option<HashSet<String>>,
    /// Codes that are never retried
    pub non_retryable_codes: HashSet<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
            retryable_codes: None,
            non_retryable_codes: HashSet::new(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom max attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Create a new retry config with custom initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Create a new retry config with custom max delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Create a new retry config with a custom backoff multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Create a new retry config with jitter enabled.
    #[must_use]
    pub const fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Restrict retries to the given error codes.
    #[must_use]
    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude an error code from retries.
    #[must_use]
    pub fn excluding_code(mut self, code: impl Into<String>) -> Self {
        self.non_retryable_codes.insert(code.into());
        self
    }

    /// Whether an error code passes the allow-list and exclusion list.
    #[must_use]
    pub fn allows_code(&self, code: &str) -> bool {
        if self.non_retryable_codes.contains(code) {
            return false;
        }
        self.retryable_codes
            .as_ref()
            .map_or(true, |allowed| allowed.contains(code))
    }
}

/// Retry policy for executing operations with automatic retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a retry policy with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Calculate the delay before retry number `retry` (zero-based).
    ///
    /// Uses exponential backoff capped at `max_delay`, with optional jitter.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(retry as i32);

        let cap = self.config.max_delay.as_millis() as f64;
        let delay_ms = base_delay.min(cap);

        let final_delay = if self.config.jitter {
            let jitter_factor = 1.0 + (rand::random::<f64>() * 0.25);
            (delay_ms * jitter_factor).min(cap)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Check if an error should be retried after `attempt` attempts (one-based).
    #[must_use]
    pub fn should_retry<E: Retryable>(&self, error: &E, attempt: u32) -> bool {
        attempt < self.config.max_attempts
            && !error.is_permanent()
            && self.config.allows_code(error.code())
    }

    /// Execute an async operation with retries.
    ///
    /// # Errors
    ///
    /// Returns the last error unchanged once it is not retryable or the
    /// attempt budget is spent.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if !self.should_retry(&error, attempt) {
                        debug!(attempt, code = error.code(), "Giving up on operation");
                        return Err(error);
                    }
                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        attempt,
                        code = error.code(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Get the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        code: &'static str,
        permanent: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.code)
        }
    }

    impl Retryable for TestError {
        fn code(&self) -> &str {
            self.code
        }

        fn is_permanent(&self) -> bool {
            self.permanent
        }
    }

    const TRANSIENT: TestError = TestError { code: "UNAVAILABLE", permanent: false };
    const PERMANENT: TestError = TestError { code: "KEY_NOT_FOUND", permanent: true };

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(
            RetryConfig::default()
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2)),
        )
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert!(!config.jitter);
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let policy = RetryPolicy::with_defaults();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let config = RetryConfig::default().with_max_delay(Duration::from_millis(150));
        let policy = RetryPolicy::new(config);

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(150));
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let config = RetryConfig::default()
            .with_jitter()
            .with_max_delay(Duration::from_millis(150));
        let policy = RetryPolicy::new(config);

        for retry in 0..8 {
            assert!(policy.delay_for_attempt(retry) <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::with_defaults();

        assert!(policy.should_retry(&TRANSIENT, 1));
        assert!(policy.should_retry(&TRANSIENT, 2));
        assert!(!policy.should_retry(&TRANSIENT, 3));
        assert!(!policy.should_retry(&PERMANENT, 1));
    }

    #[test]
    fn test_allow_list_and_exclusions() {
        let only_timeouts = RetryPolicy::new(RetryConfig::default().with_retryable_codes(["TIMEOUT"]));
        assert!(!only_timeouts.should_retry(&TRANSIENT, 1));

        let excluded = RetryPolicy::new(RetryConfig::default().excluding_code("UNAVAILABLE"));
        assert!(!excluded.should_retry(&TRANSIENT, 1));

        let permanent_allowed =
            RetryPolicy::new(RetryConfig::default().with_retryable_codes(["KEY_NOT_FOUND"]));
        assert!(!permanent_allowed.should_retry(&PERMANENT, 1));
    }

    #[tokio::test]
    async fn test_execute_success() {
        let policy = RetryPolicy::with_defaults();
        let result: Result<i32, TestError> = policy.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_execute_recovers_after_transient_failures() {
        let policy = fast_policy();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result = policy
            .execute(move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TRANSIENT)
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_returns_last_error_when_exhausted() {
        let policy = fast_policy();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), TestError> = policy
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TRANSIENT)
            })
            .await;

        assert_eq!(result.unwrap_err().code, "UNAVAILABLE");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_non_retryable_error() {
        let policy = fast_policy();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), TestError> = policy
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PERMANENT)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
