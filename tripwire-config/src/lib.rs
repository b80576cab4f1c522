//! Domain-driven configuration management for Tripwire
//!
//! Configuration is split by functional domain (breaker, retry, downstream,
//! fault injection, logging), loaded from YAML or defaults, overridden from
//! `TRIPWIRE_*` environment variables and validated before use.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    downstream::DownstreamConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    TripwireConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
