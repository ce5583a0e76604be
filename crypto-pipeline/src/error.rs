//! Error types for pipeline operations.
//!
//! Every error carries a machine-readable [`ErrorKind`] (with a stable string
//! code) and a human-readable message. Errors are classified as permanent or
//! transient so the retry layer knows what it may repeat.

use pipeline_common::Retryable;
use thiserror::Error;

use crate::models::AlgorithmKind;

/// Errors from provider, decorator and envelope operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// No strategy is registered for the algorithm, or it has the wrong kind
    #[error("Unsupported {kind} algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// Requested algorithm identifier
        algorithm: String,
        /// Kind of strategy that was requested
        kind: AlgorithmKind,
    },

    /// Decrypt, verify, rotate or describe against an unknown key
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A policy rule rejected the action
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Health check rejected because the circuit is open
    #[error("Circuit breaker open for {provider}, retry in {retry_after_ms}ms")]
    CircuitBreakerOpen {
        /// Provider guarded by the breaker
        provider: String,
        /// Milliseconds until the next trial call is admitted
        retry_after_ms: u64,
    },

    /// One or more audit sinks failed to record an event
    #[error("Audit sink failed: {0}")]
    AuditSink(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed: wrong key, tampered ciphertext or bad tag
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Signing or verification could not be performed
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Malformed request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The caller cancelled the request before it started
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Backend temporarily unavailable
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Backend call timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Backend throttled the call
    #[error("Rate limited")]
    RateLimited,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`CryptoError::UnsupportedAlgorithm`]
    UnsupportedAlgorithm,
    /// See [`CryptoError::KeyNotFound`]
    KeyNotFound,
    /// See [`CryptoError::PolicyViolation`]
    PolicyViolation,
    /// See [`CryptoError::CircuitBreakerOpen`]
    CircuitBreakerOpen,
    /// See [`CryptoError::AuditSink`]
    AuditSink,
    /// See [`CryptoError::Encryption`]
    Encryption,
    /// See [`CryptoError::Decryption`]
    Decryption,
    /// See [`CryptoError::Signing`]
    Signing,
    /// See [`CryptoError::InvalidInput`]
    InvalidInput,
    /// See [`CryptoError::Cancelled`]
    Cancelled,
    /// See [`CryptoError::Unavailable`]
    Unavailable,
    /// See [`CryptoError::Timeout`]
    Timeout,
    /// See [`CryptoError::RateLimited`]
    RateLimited,
    /// See [`CryptoError::Internal`]
    Internal,
}

impl ErrorKind {
    /// Stable code for logs, metrics labels and retry allow-lists.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::UnsupportedAlgorithm => "UNSUPPORTED_ALGORITHM",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::PolicyViolation => "POLICY_VIOLATION",
            Self::CircuitBreakerOpen => "CIRCUIT_BREAKER_OPEN",
            Self::AuditSink => "AUDIT_SINK_ERROR",
            Self::Encryption => "ENCRYPTION_FAILED",
            Self::Decryption => "DECRYPTION_FAILED",
            Self::Signing => "SIGNING_FAILED",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Cancelled => "CANCELLED",
            Self::Unavailable => "UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl CryptoError {
    /// The machine-readable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
            Self::KeyNotFound(_) => ErrorKind::KeyNotFound,
            Self::PolicyViolation(_) => ErrorKind::PolicyViolation,
            Self::CircuitBreakerOpen { .. } => ErrorKind::CircuitBreakerOpen,
            Self::AuditSink(_) => ErrorKind::AuditSink,
            Self::Encryption(_) => ErrorKind::Encryption,
            Self::Decryption(_) => ErrorKind::Decryption,
            Self::Signing(_) => ErrorKind::Signing,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error must never be retried.
    ///
    /// Configuration, authorization and integrity failures are permanent;
    /// repeating them cannot change the outcome.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnsupportedAlgorithm
                | ErrorKind::KeyNotFound
                | ErrorKind::PolicyViolation
                | ErrorKind::CircuitBreakerOpen
                | ErrorKind::AuditSink
                | ErrorKind::Decryption
                | ErrorKind::InvalidInput
                | ErrorKind::Cancelled
        )
    }

    /// Create an unsupported algorithm error.
    #[must_use]
    pub fn unsupported_algorithm(algorithm: impl Into<String>, kind: AlgorithmKind) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
            kind,
        }
    }

    /// Create a key not found error.
    #[must_use]
    pub fn key_not_found(key_id: impl Into<String>) -> Self {
        Self::KeyNotFound(key_id.into())
    }

    /// Create a policy violation error.
    #[must_use]
    pub fn policy_violation(msg: impl Into<String>) -> Self {
        Self::PolicyViolation(msg.into())
    }

    /// Create an audit sink error.
    #[must_use]
    pub fn audit_sink(msg: impl Into<String>) -> Self {
        Self::AuditSink(msg.into())
    }

    /// Create an encryption error.
    #[must_use]
    pub fn encryption(msg: impl Into<String>) -> Self {
        Self::Encryption(msg.into())
    }

    /// Create a decryption error.
    #[must_use]
    pub fn decryption(msg: impl Into<String>) -> Self {
        Self::Decryption(msg.into())
    }

    /// Create a signing error.
    #[must_use]
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl Retryable for CryptoError {
    fn code(&self) -> &str {
        self.kind().code()
    }

    fn is_permanent(&self) -> bool {
        Self::is_permanent(self)
    }
}

/// Convenience alias for pipeline results.
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_errors() {
        assert!(CryptoError::unsupported_algorithm("rot13", AlgorithmKind::Encryption).is_permanent());
        assert!(CryptoError::key_not_found("k").is_permanent());
        assert!(CryptoError::policy_violation("nope").is_permanent());
        assert!(CryptoError::audit_sink("disk full").is_permanent());
        assert!(CryptoError::decryption("bad tag").is_permanent());
    }

    #[test]
    fn test_transient_errors() {
        assert!(!CryptoError::unavailable("hsm offline").is_permanent());
        assert!(!CryptoError::Timeout("slow".to_string()).is_permanent());
        assert!(!CryptoError::RateLimited.is_permanent());
        assert!(!CryptoError::internal("glitch").is_permanent());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(CryptoError::key_not_found("k").kind().code(), "KEY_NOT_FOUND");
        assert_eq!(Retryable::code(&CryptoError::RateLimited), "RATE_LIMITED");
        assert_eq!(ErrorKind::AuditSink.to_string(), "AUDIT_SINK_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = CryptoError::unsupported_algorithm("rot13", AlgorithmKind::Signature);
        assert_eq!(err.to_string(), "Unsupported signature algorithm: rot13");

        let err = CryptoError::key_not_found("tenant-a");
        assert_eq!(err.to_string(), "Key not found: tenant-a");
    }
}
