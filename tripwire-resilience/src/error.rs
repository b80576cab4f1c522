//! Error types surfaced by the pipeline

use serde::{Deserialize, Serialize};

use crate::outcome::{Failure, Fault};

/// Result type returned by [`crate::ResiliencePipeline::execute`]
pub type ResilienceResult<T> = Result<T, ResilienceError>;

/// Final, non-success outcome of a pipeline execution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResilienceError {
    /// The downstream kept failing until the attempt budget ran out
    #[error("downstream failed after {attempts} attempt(s): {failure}")]
    HandledFault { attempts: u32, failure: Failure },

    /// A fault the classifier does not handle; surfaced without retry
    #[error("unhandled fault: {0}")]
    UnhandledFault(Fault),

    /// The breaker rejected the final attempt
    #[error("circuit breaker is open, call rejected after {attempts} attempt(s)")]
    BreakerRejected { attempts: u32 },

    /// The caller cancelled the execution
    #[error("operation cancelled")]
    Cancelled,
}

/// Coarse outcome category, for alerting and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    HandledFault,
    UnhandledFault,
    BreakerRejected,
    Cancelled,
}

impl ResilienceError {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ResilienceError::HandledFault { .. } => OutcomeKind::HandledFault,
            ResilienceError::UnhandledFault(_) => OutcomeKind::UnhandledFault,
            ResilienceError::BreakerRejected { .. } => OutcomeKind::BreakerRejected,
            ResilienceError::Cancelled => OutcomeKind::Cancelled,
        }
    }

    /// Number of attempts made, when the error came out of the retry loop
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ResilienceError::HandledFault { attempts, .. }
            | ResilienceError::BreakerRejected { attempts } => Some(*attempts),
            _ => None,
        }
    }

    /// Check if the breaker was protecting the downstream
    pub fn is_breaker_rejected(&self) -> bool {
        matches!(self, ResilienceError::BreakerRejected { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResilienceError::Cancelled)
    }
}

/// Rejected policy configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {field}: {message}")]
pub struct InvalidConfig {
    pub field: &'static str,
    pub message: String,
}

impl InvalidConfig {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}
