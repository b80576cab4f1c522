//! Outcome of a single invocation of the protected operation

use serde::{Deserialize, Serialize};

/// What went wrong with a faulted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "code", rename_all = "snake_case")]
pub enum FaultKind {
    /// Connection, DNS or IO level failure before a response arrived
    Transport,
    /// The downstream answered with a non-success status code
    Status(u16),
    /// Any other fault raised by the operation
    Other,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultKind::Transport => write!(f, "transport"),
            FaultKind::Status(code) => write!(f, "status {}", code),
            FaultKind::Other => write!(f, "other"),
        }
    }
}

/// A fault produced by the protected operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub detail: String,
}

impl Fault {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Transport, detail)
    }

    pub fn status(code: u16, detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Status(code), detail)
    }

    pub fn other(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Other, detail)
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.detail)
        }
    }
}

/// Result of one invocation attempt.
///
/// Produced once per attempt and never mutated afterwards; the classifier and
/// the breaker only ever borrow it.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    Fault(Fault),
    Timeout,
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }
}

/// A failure the classifier counted against the retry and breaker budgets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    Fault(Fault),
    Timeout,
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Fault(fault) => write!(f, "{}", fault),
            Failure::Timeout => write!(f, "timed out"),
        }
    }
}
