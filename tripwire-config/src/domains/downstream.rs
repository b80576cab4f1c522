//! Downstream dependency configuration

use crate::error::ConfigResult;
use crate::validation::{validate_positive, validate_required_string, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the protected dependency lives and how long a single call may take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownstreamConfig {
    /// Base address of the downstream service
    pub base_url: String,

    /// Path invoked by each call, relative to `base_url`
    pub path: String,

    /// Per-call timeout, in seconds
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub timeout: Duration,
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://unstable:8081".to_string(),
            path: "/api/unstable".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Validatable for DownstreamConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.base_url, "base_url", self.domain_name())?;
        validate_required_string(&self.path, "path", self.domain_name())?;
        validate_positive(self.timeout.as_secs(), "timeout", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "downstream"
    }
}
