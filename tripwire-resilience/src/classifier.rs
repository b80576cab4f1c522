//! Failure classification shared by the retry and breaker layers

use crate::outcome::{CallOutcome, FaultKind};

/// Whether an outcome counts against the retry and breaker budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Handled,
    NotHandled,
}

impl Classification {
    pub fn is_handled(self) -> bool {
        self == Classification::Handled
    }
}

/// Maps call outcomes to [`Classification`].
///
/// Timeouts, transport faults and server-side statuses (>= 500) are handled;
/// everything else is not. Stateless, so both policies can share one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureClassifier;

impl FailureClassifier {
    pub const SERVER_ERROR_FLOOR: u16 = 500;

    pub fn new() -> Self {
        Self
    }

    pub fn classify<T>(&self, outcome: &CallOutcome<T>) -> Classification {
        match outcome {
            CallOutcome::Success(_) => Classification::NotHandled,
            CallOutcome::Timeout => Classification::Handled,
            CallOutcome::Fault(fault) => match fault.kind {
                FaultKind::Transport => Classification::Handled,
                FaultKind::Status(code) if code >= Self::SERVER_ERROR_FLOOR => {
                    Classification::Handled
                }
                FaultKind::Status(_) | FaultKind::Other => Classification::NotHandled,
            },
        }
    }
}
