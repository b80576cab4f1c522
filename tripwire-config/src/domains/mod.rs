//! Domain-specific configuration modules

pub mod downstream;
pub mod logging;
pub mod resilience;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use tripwire_resilience::{CircuitBreakerConfig, FaultInjectionConfig, RetryPolicy};

/// Main Tripwire configuration combining all domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TripwireConfig {
    /// Circuit breaker thresholds and timings
    pub breaker: CircuitBreakerConfig,

    /// Retry attempts and backoff
    pub retry: RetryPolicy,

    /// Protected downstream dependency
    pub downstream: downstream::DownstreamConfig,

    /// Simulated downstream used for validation runs
    pub fault_injection: FaultInjectionConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl TripwireConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        Validatable::validate(&self.breaker)?;
        Validatable::validate(&self.retry)?;
        self.downstream.validate()?;
        Validatable::validate(&self.fault_injection)?;
        self.logging.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = TripwireConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
