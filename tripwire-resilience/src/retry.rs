//! Retry policy and executor

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffCalculator;
use crate::circuit_breaker::BreakerRejected;
use crate::classifier::{Classification, FailureClassifier};
use crate::error::{InvalidConfig, ResilienceError, ResilienceResult};
use crate::outcome::{CallOutcome, Failure};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one
    pub max_attempts: u32,

    /// Delay before the first retry; doubles for every retry after that
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Whether to randomise retry delays (full jitter)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Upper bound on invocations, first attempt included
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.base_delay.is_zero() {
            return Err(InvalidConfig::new("base_delay", "must be greater than zero"));
        }
        Ok(())
    }
}

/// What a single attempt produced, as seen by the retry loop
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    /// The operation ran and produced an outcome
    Completed(CallOutcome<T>),
    /// The breaker refused the attempt without running the operation
    Rejected(BreakerRejected),
}

impl<T> From<CallOutcome<T>> for AttemptOutcome<T> {
    fn from(outcome: CallOutcome<T>) -> Self {
        AttemptOutcome::Completed(outcome)
    }
}

/// Retry executor
#[derive(Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    backoff: BackoffCalculator,
}

impl RetryExecutor {
    /// Create a new retry executor with the given policy
    pub fn new(policy: RetryPolicy) -> Result<Self, InvalidConfig> {
        policy.validate()?;
        let backoff = BackoffCalculator::new(policy.base_delay, policy.jitter);
        Ok(Self { policy, backoff })
    }

    /// Create an executor whose jitter is drawn from `rng`
    pub fn with_rng(policy: RetryPolicy, rng: StdRng) -> Result<Self, InvalidConfig> {
        policy.validate()?;
        let backoff = BackoffCalculator::with_rng(policy.base_delay, policy.jitter, rng);
        Ok(Self { policy, backoff })
    }

    /// Create with default policy
    pub fn with_default_policy() -> Self {
        let policy = RetryPolicy::default();
        let backoff = BackoffCalculator::new(policy.base_delay, policy.jitter);
        Self { policy, backoff }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delay to sleep before retry `n` (0 after the first failure)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.backoff.calculate_delay(retry)
    }

    /// Run `attempt_fn` until it succeeds, fails with an unhandled fault, or
    /// the attempt budget is spent.
    ///
    /// `attempt_fn` receives the 1-based attempt number. Handled failures and
    /// breaker rejections are retried after a backoff sleep; the final one is
    /// returned as is. Cancellation is checked before every attempt and raced
    /// against both the attempt and the sleep.
    pub async fn execute<F, Fut, T>(
        &self,
        classifier: &FailureClassifier,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let total_attempts = self.policy.total_attempts();
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(ResilienceError::Cancelled);
            }

            debug!("Executing attempt {} of {}", attempt, total_attempts);

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Attempt {} cancelled in flight", attempt);
                    return Err(ResilienceError::Cancelled);
                }
                outcome = attempt_fn(attempt) => outcome,
            };

            let error = match outcome {
                AttemptOutcome::Completed(outcome) => {
                    let classification = classifier.classify(&outcome);
                    match (outcome, classification) {
                        (CallOutcome::Success(value), _) => {
                            if attempt > 1 {
                                info!("Operation succeeded after {} attempts", attempt);
                            }
                            return Ok(value);
                        }
                        (CallOutcome::Fault(fault), Classification::NotHandled) => {
                            warn!("Operation failed with unhandled fault: {}", fault);
                            return Err(ResilienceError::UnhandledFault(fault));
                        }
                        (CallOutcome::Fault(fault), Classification::Handled) => {
                            ResilienceError::HandledFault {
                                attempts: attempt,
                                failure: Failure::Fault(fault),
                            }
                        }
                        (CallOutcome::Timeout, _) => ResilienceError::HandledFault {
                            attempts: attempt,
                            failure: Failure::Timeout,
                        },
                    }
                }
                AttemptOutcome::Rejected(rejected) => {
                    debug!("Attempt {} rejected: {}", attempt, rejected);
                    ResilienceError::BreakerRejected { attempts: attempt }
                }
            };

            if attempt >= total_attempts {
                warn!("Operation failed after {} attempts: {}", attempt, error);
                return Err(error);
            }

            let delay = self.backoff.calculate_delay(attempt - 1);
            warn!("Attempt {} failed: {}. Retrying in {:?}", attempt, error, delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Cancelled during backoff after attempt {}", attempt);
                    return Err(ResilienceError::Cancelled);
                }
                _ = sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
