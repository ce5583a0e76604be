//! Cross-cutting decorators over the capability traits.
//!
//! Each decorator holds the next implementation of the same capability and
//! adds one concern around the call. The factory stacks them innermost to
//! outermost as policy, audit, retry, metrics; health is guarded separately
//! by the circuit breaker.
//!
//! Policy is innermost, so a rejected request still passes through the outer
//! layers on its way back. Audit and metrics ignore `PolicyViolation` and
//! retry treats it as permanent, so a rejection leaves no audit event, no
//! metrics sample and no second attempt.

mod audit;
mod circuit_breaker;
mod metrics;
mod policy;
mod retry;

pub use audit::AuditLayer;
pub use circuit_breaker::CircuitBreakerHealthMonitoring;
pub use metrics::MetricsLayer;
pub use policy::PolicyLayer;
pub use retry::RetryLayer;
