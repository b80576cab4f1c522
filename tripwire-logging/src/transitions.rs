//! Breaker transitions as log events
//!
//! Opening is logged at warn, recovery at info. Every event carries the name
//! of the dependency the breaker guards.

use std::sync::Arc;

use tripwire_resilience::{
    CircuitBreakerBuilder, ClosedEvent, HalfOpenedEvent, OpenedEvent, ResiliencePipelineBuilder,
};

/// Attach logging hooks for breaker transitions
pub trait TransitionLogging: Sized {
    fn log_transitions(self, dependency: impl Into<String>) -> Self;
}

fn log_opened(dependency: &str, event: &OpenedEvent) {
    tracing::warn!(
        dependency,
        reason = ?event.reason,
        break_duration = ?event.break_duration,
        "Circuit opened"
    );
}

fn log_half_opened(dependency: &str, event: &HalfOpenedEvent) {
    tracing::info!(
        dependency,
        open_for = ?event.open_for,
        "Circuit half-open, next call is a trial"
    );
}

fn log_closed(dependency: &str, event: &ClosedEvent) {
    tracing::info!(dependency, reason = ?event.reason, "Circuit closed");
}

impl TransitionLogging for CircuitBreakerBuilder {
    fn log_transitions(self, dependency: impl Into<String>) -> Self {
        let dependency: Arc<str> = dependency.into().into();
        let (opened, half_opened, closed) =
            (dependency.clone(), dependency.clone(), dependency);

        self.on_opened(move |event| log_opened(&opened, event))
            .on_half_opened(move |event| log_half_opened(&half_opened, event))
            .on_closed(move |event| log_closed(&closed, event))
    }
}

impl TransitionLogging for ResiliencePipelineBuilder {
    fn log_transitions(self, dependency: impl Into<String>) -> Self {
        let dependency: Arc<str> = dependency.into().into();
        let (opened, half_opened, closed) =
            (dependency.clone(), dependency.clone(), dependency);

        self.on_opened(move |event| log_opened(&opened, event))
            .on_half_opened(move |event| log_half_opened(&half_opened, event))
            .on_closed(move |event| log_closed(&closed, event))
    }
}
