//! Simulated unstable downstream used to exercise the pipeline
//!
//! Every invocation sleeps for a random delay and then fails with a server
//! error with the configured probability. A seeded target produces the same
//! sequence of delays and failures on every run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::downstream::Downstream;
use crate::error::InvalidConfig;
use crate::outcome::{CallOutcome, Fault};

/// Status returned for injected failures
pub const INJECTED_FAILURE_STATUS: u16 = 500;

/// Fault injection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultInjectionConfig {
    /// Probability in [0, 1] that a call fails
    pub failure_rate: f64,

    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,

    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    /// Fail every call regardless of `failure_rate`
    pub force_failure: bool,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.5,
            min_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(500),
            force_failure: false,
        }
    }
}

impl FaultInjectionConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.min_delay > self.max_delay {
            return Err(InvalidConfig::new(
                "min_delay",
                format!(
                    "{:?} exceeds max_delay {:?}",
                    self.min_delay, self.max_delay
                ),
            ));
        }
        Ok(())
    }
}

/// Clamp a failure rate into [0, 1]; NaN counts as never failing
pub fn clamp_failure_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        0.0
    } else {
        rate.clamp(0.0, 1.0)
    }
}

/// Body of a successful injected call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectedResponse {
    pub ok: bool,
    /// Latency the target added before answering
    #[serde(with = "humantime_serde")]
    pub delay: Duration,
    pub time: DateTime<Utc>,
}

/// Downstream double that injects latency and server failures
#[derive(Debug)]
pub struct FaultInjectingTarget {
    config: Mutex<FaultInjectionConfig>,
    rng: Mutex<StdRng>,
    invocations: AtomicU64,
}

impl FaultInjectingTarget {
    pub fn new(config: FaultInjectionConfig) -> Result<Self, InvalidConfig> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: FaultInjectionConfig, seed: u64) -> Result<Self, InvalidConfig> {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(mut config: FaultInjectionConfig, rng: StdRng) -> Result<Self, InvalidConfig> {
        config.validate()?;
        config.failure_rate = clamp_failure_rate(config.failure_rate);
        Ok(Self {
            config: Mutex::new(config),
            rng: Mutex::new(rng),
            invocations: AtomicU64::new(0),
        })
    }

    /// Target that fails every call after `delay`
    pub fn always_failing(delay: Duration) -> Self {
        Self::fixed(delay, 1.0, true)
    }

    /// Target that succeeds every call after `delay`
    pub fn always_succeeding(delay: Duration) -> Self {
        Self::fixed(delay, 0.0, false)
    }

    fn fixed(delay: Duration, failure_rate: f64, force_failure: bool) -> Self {
        Self {
            config: Mutex::new(FaultInjectionConfig {
                failure_rate,
                min_delay: delay,
                max_delay: delay,
                force_failure,
            }),
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            invocations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> FaultInjectionConfig {
        self.config.lock().clone()
    }

    pub fn set_force_failure(&self, force_failure: bool) {
        self.config.lock().force_failure = force_failure;
    }

    pub fn set_failure_rate(&self, failure_rate: f64) {
        self.config.lock().failure_rate = clamp_failure_rate(failure_rate);
    }

    /// Number of calls that reached the target
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Simulate one downstream call
    pub async fn call(&self) -> CallOutcome<InjectedResponse> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let delay = {
            let config = self.config.lock();
            self.rng.lock().gen_range(config.min_delay..=config.max_delay)
        };
        sleep(delay).await;

        let fail = {
            let config = self.config.lock();
            config.force_failure || self.rng.lock().gen::<f64>() < config.failure_rate
        };

        if fail {
            debug!("Injecting failure after {:?}", delay);
            CallOutcome::Fault(Fault::status(INJECTED_FAILURE_STATUS, "injected failure"))
        } else {
            CallOutcome::Success(InjectedResponse {
                ok: true,
                delay,
                time: Utc::now(),
            })
        }
    }
}

#[async_trait::async_trait]
impl Downstream for FaultInjectingTarget {
    type Output = InjectedResponse;

    async fn invoke(&self, cancel: CancellationToken) -> CallOutcome<InjectedResponse> {
        tokio::select! {
            _ = cancel.cancelled() => CallOutcome::Fault(Fault::other("call cancelled")),
            outcome = self.call() => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_delay_within_bounds() {
        let target = FaultInjectingTarget::seeded(
            FaultInjectionConfig {
                failure_rate: 0.0,
                min_delay: Duration::from_millis(50),
                max_delay: Duration::from_millis(80),
                force_failure: false,
            },
            9,
        )
        .unwrap();

        for _ in 0..10 {
            let started = Instant::now();
            match target.call().await {
                CallOutcome::Success(response) => {
                    assert!(response.ok);
                    assert!(response.delay >= Duration::from_millis(50));
                    assert!(response.delay <= Duration::from_millis(80));
                    assert!(started.elapsed() >= response.delay);
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert_eq!(target.invocations(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_failure_overrides_rate() {
        let target = FaultInjectingTarget::always_succeeding(Duration::from_millis(10));
        assert!(target.call().await.is_success());

        target.set_force_failure(true);
        match target.call().await {
            CallOutcome::Fault(fault) => {
                assert_eq!(fault, Fault::status(500, "injected failure"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeded_targets_agree() {
        let config = FaultInjectionConfig::default();
        let first = FaultInjectingTarget::seeded(config.clone(), 1234).unwrap();
        let second = FaultInjectingTarget::seeded(config, 1234).unwrap();

        for _ in 0..20 {
            let a = first.call().await;
            let b = second.call().await;
            assert_eq!(a.is_success(), b.is_success());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rate_is_roughly_honoured() {
        let target = FaultInjectingTarget::seeded(
            FaultInjectionConfig {
                failure_rate: 0.3,
                min_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                force_failure: false,
            },
            77,
        )
        .unwrap();

        let mut failures = 0;
        for _ in 0..1000 {
            if !target.call().await.is_success() {
                failures += 1;
            }
        }
        assert!((200..400).contains(&failures), "failures = {}", failures);
    }

    #[test]
    fn test_config_validation_and_clamping() {
        let inverted = FaultInjectionConfig {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(50),
            ..FaultInjectionConfig::default()
        };
        assert!(FaultInjectingTarget::new(inverted).is_err());

        let target = FaultInjectingTarget::new(FaultInjectionConfig {
            failure_rate: 3.0,
            ..FaultInjectionConfig::default()
        })
        .unwrap();
        assert_eq!(target.config().failure_rate, 1.0);

        target.set_failure_rate(-1.0);
        assert_eq!(target.config().failure_rate, 0.0);
        assert_eq!(clamp_failure_rate(f64::NAN), 0.0);
    }
}
