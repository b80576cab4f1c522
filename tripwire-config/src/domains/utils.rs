//! Utility functions and helpers for configuration

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Serde helper module for Duration serialization as seconds
pub mod serde_duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

/// Default functions for serde
pub fn default_false() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Timeout {
        #[serde(with = "serde_duration")]
        timeout: Duration,
    }

    #[test]
    fn test_duration_as_seconds() {
        let parsed: Timeout = serde_json::from_str(r#"{"timeout": 5}"#).unwrap();
        assert_eq!(parsed.timeout, Duration::from_secs(5));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), r#"{"timeout":5}"#);
    }
}
