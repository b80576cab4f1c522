//! Retry around circuit breaker around the protected operation

use std::future::Future;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use crate::circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig, ClosedEvent, HalfOpenedEvent,
    OpenedEvent,
};
use crate::classifier::FailureClassifier;
use crate::downstream::Downstream;
use crate::error::{InvalidConfig, ResilienceResult};
use crate::outcome::CallOutcome;
use crate::retry::{AttemptOutcome, RetryExecutor, RetryPolicy};

/// Resilience pipeline for one protected dependency.
///
/// Every attempt of the retry loop first asks the breaker for a permit. A
/// rejected attempt never reaches the operation but still uses up one attempt,
/// so a burst of retries drains quickly once the breaker opens and can still
/// land the half-open trial when the break elapses.
#[derive(Debug)]
pub struct ResiliencePipeline {
    classifier: FailureClassifier,
    retry: RetryExecutor,
    breaker: CircuitBreaker,
}

impl ResiliencePipeline {
    /// Compose an existing retry executor and breaker. The breaker may be a
    /// clone shared with other pipelines guarding the same dependency.
    pub fn new(retry: RetryExecutor, breaker: CircuitBreaker) -> Self {
        Self {
            classifier: FailureClassifier::new(),
            retry,
            breaker,
        }
    }

    pub fn builder() -> ResiliencePipelineBuilder {
        ResiliencePipelineBuilder::new()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn classifier(&self) -> &FailureClassifier {
        &self.classifier
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry.policy()
    }

    /// Run `operation` under the retry and breaker policies.
    ///
    /// `operation` receives a child of `cancel` for the underlying call. A call
    /// cancelled in flight is not recorded in the breaker.
    pub async fn execute<F, Fut, T>(
        &self,
        mut operation: F,
        cancel: &CancellationToken,
    ) -> ResilienceResult<T>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = CallOutcome<T>>,
    {
        let breaker = &self.breaker;
        let classifier = &self.classifier;

        self.retry
            .execute(classifier, cancel, |_attempt| {
                let admitted = breaker
                    .try_acquire()
                    .map(|permit| (permit, operation(cancel.child_token())));

                async move {
                    match admitted {
                        Ok((permit, call)) => {
                            let outcome = call.await;
                            permit.record(classifier.classify(&outcome));
                            AttemptOutcome::Completed(outcome)
                        }
                        Err(rejected) => AttemptOutcome::Rejected(rejected),
                    }
                }
            })
            .await
    }

    /// Run a [`Downstream`] collaborator under the pipeline
    pub async fn execute_downstream<D>(
        &self,
        downstream: &D,
        cancel: &CancellationToken,
    ) -> ResilienceResult<D::Output>
    where
        D: Downstream + ?Sized,
    {
        self.execute(|token| downstream.invoke(token), cancel).await
    }
}

/// Builder assembling a pipeline from configuration and hooks
#[derive(Debug, Default)]
pub struct ResiliencePipelineBuilder {
    retry_policy: RetryPolicy,
    breaker: CircuitBreakerBuilder,
    seed: Option<u64>,
}

impl ResiliencePipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = self.breaker.config(config);
        self
    }

    /// Seed the jitter source so retry delays are reproducible
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn on_opened(mut self, hook: impl Fn(&OpenedEvent) + Send + Sync + 'static) -> Self {
        self.breaker = self.breaker.on_opened(hook);
        self
    }

    pub fn on_closed(mut self, hook: impl Fn(&ClosedEvent) + Send + Sync + 'static) -> Self {
        self.breaker = self.breaker.on_closed(hook);
        self
    }

    pub fn on_half_opened(
        mut self,
        hook: impl Fn(&HalfOpenedEvent) + Send + Sync + 'static,
    ) -> Self {
        self.breaker = self.breaker.on_half_opened(hook);
        self
    }

    pub fn build(self) -> Result<ResiliencePipeline, InvalidConfig> {
        let breaker = self.breaker.build()?;
        let retry = match self.seed {
            Some(seed) => RetryExecutor::with_rng(self.retry_policy, StdRng::seed_from_u64(seed))?,
            None => RetryExecutor::new(self.retry_policy)?,
        };
        Ok(ResiliencePipeline::new(retry, breaker))
    }
}
