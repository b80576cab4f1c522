//! Resilience pipeline for Tripwire
//!
//! This crate wraps calls to a single downstream dependency with a bounded
//! retry policy (exponential backoff with full jitter) around a circuit
//! breaker. Both layers share one failure classifier, so they always agree on
//! what counts as a failure.

pub mod backoff;
pub mod circuit_breaker;
pub mod classifier;
pub mod downstream;
pub mod error;
pub mod outcome;
pub mod pipeline;
pub mod retry;

#[cfg(feature = "fault-injection")]
pub mod fault_injection;

// Re-export commonly used types
pub use backoff::BackoffCalculator;
pub use circuit_breaker::{
    BreakerHooks, BreakerPermit, BreakerRejected, BreakerSnapshot, CircuitBreaker,
    CircuitBreakerBuilder, CircuitBreakerConfig, CircuitMetrics, CircuitState, CloseReason,
    ClosedEvent, HalfOpenedEvent, OpenReason, OpenedEvent,
};
pub use classifier::{Classification, FailureClassifier};
pub use downstream::Downstream;
pub use error::{InvalidConfig, OutcomeKind, ResilienceError, ResilienceResult};
pub use outcome::{CallOutcome, Failure, Fault, FaultKind};
pub use pipeline::{ResiliencePipeline, ResiliencePipelineBuilder};
pub use retry::{AttemptOutcome, RetryExecutor, RetryPolicy};

#[cfg(feature = "fault-injection")]
pub use fault_injection::{FaultInjectingTarget, FaultInjectionConfig, InjectedResponse};

pub use tokio_util::sync::CancellationToken;
