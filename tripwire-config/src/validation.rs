//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};
use tripwire_resilience::InvalidConfig;

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Lift a policy-level validation error into a domain error
pub fn from_policy_error(error: InvalidConfig, domain: &str) -> ConfigError {
    ConfigError::DomainError {
        domain: domain.to_string(),
        message: error.to_string(),
    }
}

/// Validate a required string field
pub fn validate_required_string(value: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} cannot be empty", field_name),
        });
    }
    Ok(())
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate an HTTP(S) URL
pub fn validate_url(url: &str, field_name: &str, domain: &str) -> ConfigResult<()> {
    validate_required_string(url, field_name, domain)?;

    let parsed = url::Url::parse(url).map_err(|e| ConfigError::DomainError {
        domain: domain.to_string(),
        message: format!("{} has invalid URL format: {}", field_name, e),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} scheme '{}' not supported (only http/https)", field_name, scheme),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1u32, "count", "test").is_ok());
        assert!(validate_positive(0u32, "count", "test").is_err());
        assert!(validate_positive(0.5f64, "ratio", "test").is_ok());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://unstable:8081", "base_url", "downstream").is_ok());
        assert!(validate_url("https://example.com/api", "base_url", "downstream").is_ok());
        assert!(validate_url("not-a-url", "base_url", "downstream").is_err());
        assert!(validate_url("ftp://example.com", "base_url", "downstream").is_err());
        assert!(validate_url("  ", "base_url", "downstream").is_err());
    }

    #[test]
    fn test_policy_error_keeps_domain() {
        let error = tripwire_resilience::CircuitBreakerConfig {
            minimum_throughput: 0,
            ..Default::default()
        }
        .validate()
        .unwrap_err();

        match from_policy_error(error, "breaker") {
            ConfigError::DomainError { domain, message } => {
                assert_eq!(domain, "breaker");
                assert!(message.contains("minimum_throughput"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
