//! Per-request context passed explicitly through the decorator chain.
//!
//! The context is owned by the caller and travels inside each request, so
//! nothing in the pipeline keeps process-wide correlation state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// Cloneable cancellation flag shared between a caller and its request.
///
/// Providers check it before starting work. Backoff waits in the retry layer
/// do not observe it, so a cancelled request finishes its current attempt.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Create a signal that is not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark every clone of this signal as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Correlation and cancellation data for one logical request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identifier tying together every audit event of one logical request
    pub correlation_id: String,
    /// Optional cancellation flag
    pub cancellation: Option<CancellationSignal>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestContext {
    /// Create a context with a fresh random correlation identifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            cancellation: None,
        }
    }

    /// Create a context with a caller-chosen correlation identifier.
    #[must_use]
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            cancellation: None,
        }
    }

    /// Attach a cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, signal: CancellationSignal) -> Self {
        self.cancellation = Some(signal);
        self
    }

    /// Whether the attached signal, if any, has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationSignal::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_contexts_have_distinct_correlation_ids() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert_ne!(a.correlation_id, b.correlation_id);
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_cancellation_is_shared_between_clones() {
        let signal = CancellationSignal::new();
        let ctx = RequestContext::with_correlation_id("req-1").with_cancellation(signal.clone());

        assert!(!ctx.is_cancelled());
        signal.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.correlation_id, "req-1");
    }
}
