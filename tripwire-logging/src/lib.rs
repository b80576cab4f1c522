//! Logging for Tripwire
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`] and turns
//! circuit breaker transitions into log events.

pub mod init;
pub mod transitions;

pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
pub use transitions::TransitionLogging;
pub use tripwire_config::{LogFormat, LogLevel, LoggingConfig};
