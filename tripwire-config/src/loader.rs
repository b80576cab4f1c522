//! Configuration loading and environment variable handling

use crate::domains::downstream::DownstreamConfig;
use crate::domains::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::domains::TripwireConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;
use tripwire_resilience::fault_injection::clamp_failure_rate;
use tripwire_resilience::{CircuitBreakerConfig, FaultInjectionConfig, RetryPolicy};

/// Configuration loader with environment variable support
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "TRIPWIRE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML (or `.json`) file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<TripwireConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: TripwireConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        debug!("Loaded configuration from {}", path.display());

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<TripwireConfig> {
        let mut config = TripwireConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<TripwireConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut TripwireConfig) -> ConfigResult<()> {
        self.apply_breaker_overrides(&mut config.breaker)?;
        self.apply_retry_overrides(&mut config.retry)?;
        self.apply_downstream_overrides(&mut config.downstream)?;
        self.apply_fault_injection_overrides(&mut config.fault_injection)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_breaker_overrides(&self, config: &mut CircuitBreakerConfig) -> ConfigResult<()> {
        if let Some(ratio) = self.parse_env_var("BREAKER_FAILURE_RATIO")? {
            config.failure_ratio = ratio;
        }

        if let Some(throughput) = self.parse_env_var("BREAKER_MINIMUM_THROUGHPUT")? {
            config.minimum_throughput = throughput;
        }

        if let Some(seconds) = self.parse_env_var("BREAKER_SAMPLING_SECONDS")? {
            config.sampling_duration = Duration::from_secs(seconds);
        }

        if let Some(seconds) = self.parse_env_var("BREAKER_BREAK_SECONDS")? {
            config.break_duration = Duration::from_secs(seconds);
        }

        Ok(())
    }

    fn apply_retry_overrides(&self, config: &mut RetryPolicy) -> ConfigResult<()> {
        if let Some(max_attempts) = self.parse_env_var("RETRY_MAX_ATTEMPTS")? {
            config.max_attempts = max_attempts;
        }

        if let Some(millis) = self.parse_env_var("RETRY_BASE_DELAY_MS")? {
            config.base_delay = Duration::from_millis(millis);
        }

        if let Some(jitter) = self.parse_env_var("RETRY_JITTER")? {
            config.jitter = jitter;
        }

        Ok(())
    }

    fn apply_downstream_overrides(&self, config: &mut DownstreamConfig) -> ConfigResult<()> {
        if let Ok(base_url) = self.get_env_var("DOWNSTREAM_BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(path) = self.get_env_var("DOWNSTREAM_PATH") {
            config.path = path;
        }

        if let Some(seconds) = self.parse_env_var("DOWNSTREAM_TIMEOUT_SECONDS")? {
            config.timeout = Duration::from_secs(seconds);
        }

        Ok(())
    }

    fn apply_fault_injection_overrides(
        &self,
        config: &mut FaultInjectionConfig,
    ) -> ConfigResult<()> {
        // Out-of-range rates are clamped rather than rejected
        if let Some(rate) = self.parse_env_var::<f64>("FAULT_FAILURE_RATE")? {
            config.failure_rate = clamp_failure_rate(rate);
        }

        if let Some(millis) = self.parse_env_var("FAULT_MIN_DELAY_MS")? {
            config.min_delay = Duration::from_millis(millis);
        }

        if let Some(millis) = self.parse_env_var("FAULT_MAX_DELAY_MS")? {
            config.max_delay = Duration::from_millis(millis);
        }

        if let Some(hard_fail) = self.parse_env_var("FAULT_HARD_FAIL")? {
            config.force_failure = hard_fail;
        }

        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut LoggingConfig) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Parse a prefixed variable if it is set
    fn parse_env_var<T>(&self, name: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_env_var(name) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e))),
            Err(_) => Ok(None),
        }
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
