//! Circuit breaker pattern implementation
//!
//! The breaker counts calls and handled failures inside a sampling window.
//! Once enough calls were seen and the failure ratio reaches the configured
//! threshold it opens and rejects every call until the break duration has
//! elapsed. The next request after that becomes a single half-open trial whose
//! outcome either closes the breaker again or restarts the break.
//!
//! ```text
//! Closed ──[ratio >= threshold, total >= min throughput]──> Open
//!   ▲                                                         │
//!   │                                      [break elapsed, next request]
//!   │                                                         ▼
//!   └────────────[trial succeeds]──────────────────────── HalfOpen
//!                [trial fails] ─────────────────────────────> Open
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classifier::Classification;
use crate::error::InvalidConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests are rejected without reaching the downstream
    Open,
    /// Circuit is half-open, a single trial request tests recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failure ratio in the sampling window that opens the circuit, in (0, 1]
    pub failure_ratio: f64,

    /// Minimum number of calls in the window before the ratio is evaluated
    pub minimum_throughput: u32,

    /// Length of the sampling window
    #[serde(with = "humantime_serde")]
    pub sampling_duration: Duration,

    /// How long the circuit stays open before a trial is allowed
    #[serde(with = "humantime_serde")]
    pub break_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            minimum_throughput: 8,
            sampling_duration: Duration::from_secs(30),
            break_duration: Duration::from_secs(10),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(self.failure_ratio > 0.0 && self.failure_ratio <= 1.0) {
            return Err(InvalidConfig::new(
                "failure_ratio",
                format!("must be in (0, 1], got {}", self.failure_ratio),
            ));
        }
        if self.minimum_throughput < 1 {
            return Err(InvalidConfig::new("minimum_throughput", "must be at least 1"));
        }
        if self.sampling_duration.is_zero() {
            return Err(InvalidConfig::new(
                "sampling_duration",
                "must be greater than zero",
            ));
        }
        if self.break_duration.is_zero() {
            return Err(InvalidConfig::new("break_duration", "must be greater than zero"));
        }
        Ok(())
    }
}

/// Lifetime counters, never reset by state transitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitMetrics {
    /// Calls that reached the downstream and reported an outcome
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Requests rejected while open or while a trial was in flight
    pub total_rejected: u64,
}

/// Why the circuit opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpenReason {
    /// The failure ratio crossed the threshold while closed
    FailureRatio { failed: u32, total: u32 },
    /// The half-open trial call failed
    TrialFailed,
}

/// Why the circuit closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TrialSucceeded,
    ManualReset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenedEvent {
    pub reason: OpenReason,
    pub break_duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedEvent {
    pub reason: CloseReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HalfOpenedEvent {
    /// How long the circuit was open before the trial was admitted
    pub open_for: Duration,
}

type Hook<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Transition observers, invoked synchronously after the state lock is released
#[derive(Clone, Default)]
pub struct BreakerHooks {
    on_opened: Vec<Hook<OpenedEvent>>,
    on_closed: Vec<Hook<ClosedEvent>>,
    on_half_opened: Vec<Hook<HalfOpenedEvent>>,
}

impl std::fmt::Debug for BreakerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerHooks")
            .field("on_opened", &self.on_opened.len())
            .field("on_closed", &self.on_closed.len())
            .field("on_half_opened", &self.on_half_opened.len())
            .finish()
    }
}

impl BreakerHooks {
    pub fn on_opened(&mut self, hook: impl Fn(&OpenedEvent) + Send + Sync + 'static) {
        self.on_opened.push(Arc::new(hook));
    }

    pub fn on_closed(&mut self, hook: impl Fn(&ClosedEvent) + Send + Sync + 'static) {
        self.on_closed.push(Arc::new(hook));
    }

    pub fn on_half_opened(&mut self, hook: impl Fn(&HalfOpenedEvent) + Send + Sync + 'static) {
        self.on_half_opened.push(Arc::new(hook));
    }

    fn emit(&self, transition: Transition) {
        match transition {
            Transition::Opened(event) => self.on_opened.iter().for_each(|hook| hook(&event)),
            Transition::Closed(event) => self.on_closed.iter().for_each(|hook| hook(&event)),
            Transition::HalfOpened(event) => {
                self.on_half_opened.iter().for_each(|hook| hook(&event))
            }
        }
    }
}

enum Transition {
    Opened(OpenedEvent),
    Closed(ClosedEvent),
    HalfOpened(HalfOpenedEvent),
}

/// Returned by [`CircuitBreaker::try_acquire`] when a call may not proceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is {state}")]
pub struct BreakerRejected {
    pub state: CircuitState,
    /// Time left until a trial is admitted, when the circuit is open
    pub retry_after: Option<Duration>,
}

/// Serialisable view of the breaker for health endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub last_state_change: DateTime<Utc>,
    pub window_total: u32,
    pub window_failed: u32,
    pub metrics: CircuitMetrics,
}

/// Tumbling count of calls and handled failures
#[derive(Debug, Clone, Copy)]
struct SamplingWindow {
    started_at: Instant,
    total_calls: u32,
    failed_calls: u32,
}

impl SamplingWindow {
    fn new(now: Instant) -> Self {
        Self {
            started_at: now,
            total_calls: 0,
            failed_calls: 0,
        }
    }

    fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }

    /// Start a fresh window once the current one has covered `duration`
    fn roll(&mut self, now: Instant, duration: Duration) {
        if now.saturating_duration_since(self.started_at) >= duration {
            self.reset(now);
        }
    }

    fn record(&mut self, handled: bool) {
        self.total_calls = self.total_calls.saturating_add(1);
        if handled {
            self.failed_calls = self.failed_calls.saturating_add(1);
        }
    }

    fn failure_ratio(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            f64::from(self.failed_calls) / f64::from(self.total_calls)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    /// Closed-state call, valid only for the closed cycle it was issued in
    Normal { cycle: u64 },
    /// The half-open trial identified by its token
    Trial { token: u64 },
}

/// Admission ticket for one call.
///
/// Report the classified outcome with [`BreakerPermit::record`]. A permit that
/// is dropped unrecorded (for example because the caller was cancelled) leaves
/// the sampling window untouched and hands the half-open trial token back.
#[must_use = "a permit must be recorded or dropped to settle the call"]
pub struct BreakerPermit {
    breaker: CircuitBreaker,
    kind: PermitKind,
    settled: bool,
}

impl BreakerPermit {
    pub fn is_trial(&self) -> bool {
        matches!(self.kind, PermitKind::Trial { .. })
    }

    pub fn record(mut self, classification: Classification) {
        self.settled = true;
        self.breaker.settle(self.kind, classification);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let PermitKind::Trial { token } = self.kind {
            self.breaker.release_trial(token);
        }
    }
}

impl std::fmt::Debug for BreakerPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("kind", &self.kind)
            .field("settled", &self.settled)
            .finish()
    }
}

/// Thread-safe circuit breaker for one protected dependency.
///
/// Clones share state; independent dependencies should each get their own
/// breaker built with [`CircuitBreaker::new`] or [`CircuitBreakerBuilder`].
#[derive(Clone)]
pub struct CircuitBreaker {
    config: Arc<CircuitBreakerConfig>,
    hooks: Arc<BreakerHooks>,
    state: Arc<Mutex<CircuitBreakerState>>,
}

struct CircuitBreakerState {
    state: CircuitState,
    window: SamplingWindow,
    metrics: CircuitMetrics,
    opened_at: Option<Instant>,
    last_state_change: DateTime<Utc>,
    /// Bumped on every transition so stale closed-cycle permits are ignored
    cycle: u64,
    /// Token of the in-flight half-open trial
    trial: Option<u64>,
    next_trial_token: u64,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, InvalidConfig> {
        config.validate()?;
        Ok(Self::from_parts(config, BreakerHooks::default()))
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::from_parts(CircuitBreakerConfig::default(), BreakerHooks::default())
    }

    pub fn builder() -> CircuitBreakerBuilder {
        CircuitBreakerBuilder::new()
    }

    fn from_parts(config: CircuitBreakerConfig, hooks: BreakerHooks) -> Self {
        let now = Instant::now();
        Self {
            config: Arc::new(config),
            hooks: Arc::new(hooks),
            state: Arc::new(Mutex::new(CircuitBreakerState {
                state: CircuitState::Closed,
                window: SamplingWindow::new(now),
                metrics: CircuitMetrics::default(),
                opened_at: None,
                last_state_change: Utc::now(),
                cycle: 0,
                trial: None,
                next_trial_token: 0,
            })),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state. Reading never triggers the open to half-open transition;
    /// only a call request does.
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Get current metrics
    pub fn metrics(&self) -> CircuitMetrics {
        self.state.lock().metrics.clone()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        BreakerSnapshot {
            state: state.state,
            last_state_change: state.last_state_change,
            window_total: state.window.total_calls,
            window_failed: state.window.failed_calls,
            metrics: state.metrics.clone(),
        }
    }

    /// Ask to let one call through.
    ///
    /// Closed admits everything. Open rejects until the break has elapsed, at
    /// which point the request moves the breaker to half-open and becomes the
    /// trial. While a trial is in flight every other request is rejected.
    pub fn try_acquire(&self) -> Result<BreakerPermit, BreakerRejected> {
        let now = Instant::now();
        let (admission, transition) = {
            let mut state = self.state.lock();
            let transition = self.half_open_if_due(&mut state, now);

            let current = state.state;
            let admission = match current {
                CircuitState::Closed => Ok(PermitKind::Normal { cycle: state.cycle }),
                CircuitState::HalfOpen if state.trial.is_none() => {
                    let token = state.next_trial_token;
                    state.next_trial_token += 1;
                    state.trial = Some(token);
                    debug!("Circuit breaker admitted half-open trial");
                    Ok(PermitKind::Trial { token })
                }
                _ => {
                    state.metrics.total_rejected += 1;
                    let retry_after = state.opened_at.and_then(|opened_at| {
                        (current == CircuitState::Open).then(|| {
                            self.config
                                .break_duration
                                .saturating_sub(now.saturating_duration_since(opened_at))
                        })
                    });
                    Err(BreakerRejected {
                        state: current,
                        retry_after,
                    })
                }
            };
            (admission, transition)
        };

        if let Some(transition) = transition {
            self.hooks.emit(transition);
        }

        admission.map(|kind| BreakerPermit {
            breaker: self.clone(),
            kind,
            settled: false,
        })
    }

    /// Force the breaker back to closed with an empty window and fresh metrics
    pub fn reset(&self) {
        let was_closed = {
            let mut state = self.state.lock();
            let was_closed = state.state == CircuitState::Closed;
            self.enter(&mut state, CircuitState::Closed, Instant::now());
            state.opened_at = None;
            state.metrics = CircuitMetrics::default();
            was_closed
        };

        if !was_closed {
            info!("Circuit breaker manually reset to closed");
            self.hooks.emit(Transition::Closed(ClosedEvent {
                reason: CloseReason::ManualReset,
            }));
        }
    }

    // Internal methods

    fn settle(&self, kind: PermitKind, classification: Classification) {
        let now = Instant::now();
        let handled = classification.is_handled();

        let transition = {
            let mut state = self.state.lock();
            state.metrics.total_requests += 1;
            if handled {
                state.metrics.total_failures += 1;
            } else {
                state.metrics.total_successes += 1;
            }

            match kind {
                PermitKind::Normal { cycle } => {
                    if state.state != CircuitState::Closed || state.cycle != cycle {
                        debug!("Discarding outcome of a call admitted before the last transition");
                        None
                    } else {
                        state.window.roll(now, self.config.sampling_duration);
                        state.window.record(handled);
                        self.open_if_tripped(&mut state, now)
                    }
                }
                PermitKind::Trial { token } => {
                    if state.state != CircuitState::HalfOpen || state.trial != Some(token) {
                        debug!("Discarding outcome of a stale half-open trial");
                        None
                    } else if handled {
                        Some(self.open(&mut state, now, OpenReason::TrialFailed))
                    } else {
                        self.enter(&mut state, CircuitState::Closed, now);
                        state.opened_at = None;
                        info!("Circuit breaker closed after successful trial");
                        Some(Transition::Closed(ClosedEvent {
                            reason: CloseReason::TrialSucceeded,
                        }))
                    }
                }
            }
        };

        if let Some(transition) = transition {
            self.hooks.emit(transition);
        }
    }

    fn release_trial(&self, token: u64) {
        let mut state = self.state.lock();
        if state.trial == Some(token) {
            state.trial = None;
            debug!("Half-open trial abandoned without an outcome");
        }
    }

    fn half_open_if_due(
        &self,
        state: &mut CircuitBreakerState,
        now: Instant,
    ) -> Option<Transition> {
        if state.state != CircuitState::Open {
            return None;
        }
        let opened_at = state.opened_at?;
        let open_for = now.saturating_duration_since(opened_at);
        if open_for < self.config.break_duration {
            return None;
        }

        self.enter(state, CircuitState::HalfOpen, now);
        info!("Circuit breaker half-open after {:?}, allowing a trial call", open_for);
        Some(Transition::HalfOpened(HalfOpenedEvent { open_for }))
    }

    fn open_if_tripped(&self, state: &mut CircuitBreakerState, now: Instant) -> Option<Transition> {
        let window = state.window;
        if window.total_calls < self.config.minimum_throughput
            || window.failure_ratio() < self.config.failure_ratio
        {
            return None;
        }

        Some(self.open(
            state,
            now,
            OpenReason::FailureRatio {
                failed: window.failed_calls,
                total: window.total_calls,
            },
        ))
    }

    fn open(&self, state: &mut CircuitBreakerState, now: Instant, reason: OpenReason) -> Transition {
        self.enter(state, CircuitState::Open, now);
        state.opened_at = Some(now);
        match reason {
            OpenReason::FailureRatio { failed, total } => warn!(
                "Circuit breaker opened for {:?}: {} of {} calls failed",
                self.config.break_duration, failed, total
            ),
            OpenReason::TrialFailed => warn!(
                "Circuit breaker reopened for {:?}: half-open trial failed",
                self.config.break_duration
            ),
        }
        Transition::Opened(OpenedEvent {
            reason,
            break_duration: self.config.break_duration,
        })
    }

    fn enter(&self, state: &mut CircuitBreakerState, next: CircuitState, now: Instant) {
        state.state = next;
        state.cycle += 1;
        state.trial = None;
        state.window.reset(now);
        state.last_state_change = Utc::now();
    }
}

/// Builder for a circuit breaker and its transition hooks
#[derive(Debug, Default)]
pub struct CircuitBreakerBuilder {
    config: CircuitBreakerConfig,
    hooks: BreakerHooks,
}

impl CircuitBreakerBuilder {
    /// Create a new builder with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.config.failure_ratio = ratio;
        self
    }

    pub fn minimum_throughput(mut self, calls: u32) -> Self {
        self.config.minimum_throughput = calls;
        self
    }

    pub fn sampling_duration(mut self, duration: Duration) -> Self {
        self.config.sampling_duration = duration;
        self
    }

    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.config.break_duration = duration;
        self
    }

    pub fn on_opened(mut self, hook: impl Fn(&OpenedEvent) + Send + Sync + 'static) -> Self {
        self.hooks.on_opened(hook);
        self
    }

    pub fn on_closed(mut self, hook: impl Fn(&ClosedEvent) + Send + Sync + 'static) -> Self {
        self.hooks.on_closed(hook);
        self
    }

    pub fn on_half_opened(
        mut self,
        hook: impl Fn(&HalfOpenedEvent) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.on_half_opened(hook);
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> Result<CircuitBreaker, InvalidConfig> {
        self.config.validate()?;
        Ok(CircuitBreaker::from_parts(self.config, self.hooks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use Classification::{Handled, NotHandled};

    fn call(breaker: &CircuitBreaker, classification: Classification) {
        breaker
            .try_acquire()
            .expect("breaker should admit the call")
            .record(classification);
    }

    fn breaker(min: u32, break_duration: Duration) -> CircuitBreaker {
        CircuitBreakerBuilder::new()
            .failure_ratio(0.5)
            .minimum_throughput(min)
            .sampling_duration(Duration::from_secs(30))
            .break_duration(break_duration)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_call_that_reaches_throughput() {
        let opened = Arc::new(AtomicU32::new(0));
        let opened_hook = opened.clone();
        let breaker = CircuitBreakerBuilder::new()
            .on_opened(move |event| {
                assert_eq!(event.reason, OpenReason::FailureRatio { failed: 4, total: 8 });
                opened_hook.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let sequence = [
            Handled, Handled, Handled, Handled, NotHandled, NotHandled, NotHandled,
        ];
        for classification in sequence {
            call(&breaker, classification);
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        // 8th call: throughput reached with 4/8 failures
        call(&breaker, NotHandled);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_ratio_evaluated_after_each_call() {
        let breaker = breaker(4, Duration::from_secs(10));

        for classification in [NotHandled, NotHandled, NotHandled, Handled, Handled] {
            call(&breaker, classification);
            assert_eq!(breaker.state(), CircuitState::Closed);
        }

        // 3 of 6 reaches the 0.5 threshold
        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_do_not_touch_window() {
        let breaker = breaker(2, Duration::from_secs(10));
        call(&breaker, Handled);
        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Open);

        for _ in 0..5 {
            let rejected = breaker.try_acquire().unwrap_err();
            assert_eq!(rejected.state, CircuitState::Open);
            assert_eq!(rejected.retry_after, Some(Duration::from_secs(10)));
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.window_total, 0);
        assert_eq!(snapshot.window_failed, 0);
        assert_eq!(snapshot.metrics.total_rejected, 5);
        assert_eq!(snapshot.metrics.total_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial_and_closes() {
        let closed = Arc::new(AtomicU32::new(0));
        let half_opened = Arc::new(AtomicU32::new(0));
        let (closed_hook, half_opened_hook) = (closed.clone(), half_opened.clone());
        let breaker = CircuitBreakerBuilder::new()
            .minimum_throughput(1)
            .break_duration(Duration::from_secs(10))
            .on_closed(move |event| {
                assert_eq!(event.reason, CloseReason::TrialSucceeded);
                closed_hook.fetch_add(1, Ordering::SeqCst);
            })
            .on_half_opened(move |event| {
                assert!(event.open_for >= Duration::from_secs(10));
                half_opened_hook.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        // Reading state alone does not start the trial
        assert_eq!(breaker.state(), CircuitState::Open);

        let trial = breaker.try_acquire().unwrap();
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(half_opened.load(Ordering::SeqCst), 1);

        let competitor = breaker.try_acquire().unwrap_err();
        assert_eq!(competitor.state, CircuitState::HalfOpen);
        assert_eq!(competitor.retry_after, None);

        trial.record(NotHandled);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.window_total, 0);
        assert_eq!(snapshot.window_failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_trial_reopens_and_restarts_timer() {
        let opened = Arc::new(AtomicU32::new(0));
        let opened_hook = opened.clone();
        let breaker = CircuitBreakerBuilder::new()
            .minimum_throughput(1)
            .break_duration(Duration::from_secs(10))
            .on_opened(move |_| {
                opened_hook.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        call(&breaker, Handled);
        tokio::time::advance(Duration::from_secs(10)).await;

        breaker.try_acquire().unwrap().record(Handled);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(opened.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        let rejected = breaker.try_acquire().unwrap_err();
        assert_eq!(rejected.retry_after, Some(Duration::from_secs(4)));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(breaker.try_acquire().unwrap().is_trial());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_releases_token() {
        let breaker = breaker(1, Duration::from_secs(1));
        call(&breaker, Handled);
        tokio::time::advance(Duration::from_secs(1)).await;

        let trial = breaker.try_acquire().unwrap();
        assert!(breaker.try_acquire().is_err());
        drop(trial);

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        let retry = breaker.try_acquire().unwrap();
        assert!(retry.is_trial());
        retry.record(NotHandled);
        assert_eq!(breaker.state(), CircuitState::Closed);
        // The abandoned trial was never counted
        assert_eq!(breaker.metrics().total_requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_tumbles_after_sampling_duration() {
        let breaker = CircuitBreakerBuilder::new()
            .minimum_throughput(4)
            .sampling_duration(Duration::from_secs(5))
            .build()
            .unwrap();

        call(&breaker, Handled);
        call(&breaker, Handled);
        call(&breaker, Handled);

        tokio::time::advance(Duration::from_secs(5)).await;

        // Old failures no longer count
        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().window_total, 1);

        call(&breaker, Handled);
        call(&breaker, Handled);
        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_closed_permit_is_discarded() {
        let breaker = breaker(2, Duration::from_secs(10));
        let slow = breaker.try_acquire().unwrap();

        call(&breaker, Handled);
        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Open);

        slow.record(Handled);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().window_total, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_and_clears() {
        let closed = Arc::new(AtomicU32::new(0));
        let closed_hook = closed.clone();
        let breaker = CircuitBreakerBuilder::new()
            .minimum_throughput(1)
            .on_closed(move |event| {
                assert_eq!(event.reason, CloseReason::ManualReset);
                closed_hook.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        breaker.reset();
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        call(&breaker, Handled);
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.metrics(), CircuitMetrics::default());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_independent_breakers_do_not_share_state() {
        let first = CircuitBreakerBuilder::new().minimum_throughput(1).build().unwrap();
        let second = CircuitBreakerBuilder::new().minimum_throughput(1).build().unwrap();

        call(&first, Handled);
        assert_eq!(first.state(), CircuitState::Open);
        assert_eq!(second.state(), CircuitState::Closed);
        assert!(second.try_acquire().is_ok());
    }

    #[test]
    fn test_concurrent_requests_get_one_trial() {
        let breaker = breaker(1, Duration::from_millis(20));
        call(&breaker, Handled);
        thread::sleep(Duration::from_millis(40));

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = breaker.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    // Keep the permit alive so the trial stays in flight
                    breaker.try_acquire().ok().map(|permit| {
                        thread::sleep(Duration::from_millis(20));
                        permit
                    })
                })
            })
            .collect();

        let admitted: Vec<_> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(admitted.len(), 1);
        assert_eq!(breaker.metrics().total_rejected, 7);
    }

    #[test]
    fn test_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());

        let err = CircuitBreaker::builder().failure_ratio(0.0).build().unwrap_err();
        assert_eq!(err.field, "failure_ratio");
        assert!(CircuitBreaker::builder().failure_ratio(1.5).build().is_err());
        assert!(CircuitBreaker::builder().failure_ratio(f64::NAN).build().is_err());
        assert!(CircuitBreaker::builder().failure_ratio(1.0).build().is_ok());
        assert!(CircuitBreaker::builder().minimum_throughput(0).build().is_err());
        assert!(CircuitBreaker::builder()
            .sampling_duration(Duration::ZERO)
            .build()
            .is_err());
        assert!(CircuitBreaker::builder()
            .break_duration(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_config_serde_uses_humantime() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failure_ratio":0.25,"break_duration":"2s"}"#).unwrap();
        assert_eq!(config.failure_ratio, 0.25);
        assert_eq!(config.break_duration, Duration::from_secs(2));
        assert_eq!(config.minimum_throughput, 8);
        assert_eq!(config.sampling_duration, Duration::from_secs(30));
    }

    #[test]
    fn test_snapshot_serializes_state() {
        let snapshot = CircuitBreaker::with_defaults().snapshot();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "closed");
        assert!(json["last_state_change"].is_string());
    }
}
