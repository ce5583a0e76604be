//! Resilience primitives shared by the crypto pipeline.
//!
//! This crate provides centralized implementations for:
//! - Retry policies with exponential backoff and error-code allow-lists
//! - Circuit breaker state machine with time-based recovery
//! - Bounded LRU cache with per-entry time-to-live
//! - Tracing subscriber initialization
//!
//! Nothing in here knows about keys or ciphers; the crypto layer plugs its
//! own error type in through [`Retryable`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod circuit_breaker;
pub mod retry;
pub mod tracing_config;

pub use cache::{CacheEntry, CacheStats, LruTtlCache};
pub use circuit_breaker::{BreakerOpen, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{RetryConfig, RetryPolicy, Retryable};
pub use tracing_config::{init_tracing, TracingConfig, TryInitError};
