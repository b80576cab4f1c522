//! Retry, breaker and fault-injection policy domains
//!
//! The policy types live in `tripwire-resilience`; this module plugs them
//! into domain validation so a bad value is reported with its domain name.

use crate::error::ConfigResult;
use crate::validation::{from_policy_error, Validatable};
use tripwire_resilience::{CircuitBreakerConfig, FaultInjectionConfig, RetryPolicy};

impl Validatable for CircuitBreakerConfig {
    fn validate(&self) -> ConfigResult<()> {
        CircuitBreakerConfig::validate(self).map_err(|e| from_policy_error(e, self.domain_name()))
    }

    fn domain_name(&self) -> &'static str {
        "breaker"
    }
}

impl Validatable for RetryPolicy {
    fn validate(&self) -> ConfigResult<()> {
        RetryPolicy::validate(self).map_err(|e| from_policy_error(e, self.domain_name()))
    }

    fn domain_name(&self) -> &'static str {
        "retry"
    }
}

impl Validatable for FaultInjectionConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(self.validation_error(format!(
                "failure_rate must be within [0, 1], got {}",
                self.failure_rate
            )));
        }
        FaultInjectionConfig::validate(self).map_err(|e| from_policy_error(e, self.domain_name()))
    }

    fn domain_name(&self) -> &'static str {
        "fault_injection"
    }
}
