//! HTTP client implementation

use crate::errors::HttpError;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tripwire_config::DownstreamConfig;
use tripwire_resilience::{CallOutcome, Downstream, Fault};

/// Successful downstream answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownstreamResponse {
    pub status: u16,
    pub body: String,
}

impl DownstreamResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// reqwest-backed client for the protected dependency
#[derive(Debug, Clone)]
pub struct DownstreamClient {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl DownstreamClient {
    pub fn new(config: &DownstreamConfig) -> Result<Self, HttpError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        let endpoint = base
            .join(&config.path)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {}", config.path, e)))?;

        debug!(
            "Creating downstream client for {} with {}s timeout",
            endpoint,
            config.timeout.as_secs_f64()
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("tripwire/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform one GET against the endpoint
    pub async fn get(&self) -> CallOutcome<DownstreamResponse> {
        let response = match self.client.get(self.endpoint.clone()).send().await {
            Ok(response) => response,
            Err(err) => return Self::failed(err),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return Self::failed(err),
        };

        if status.is_success() {
            CallOutcome::Success(DownstreamResponse {
                status: status.as_u16(),
                body,
            })
        } else {
            debug!("Downstream {} answered {}", self.endpoint, status);
            CallOutcome::Fault(Fault::status(status.as_u16(), body))
        }
    }

    fn failed<T>(err: reqwest::Error) -> CallOutcome<T> {
        if err.is_timeout() {
            warn!("Downstream call timed out");
            CallOutcome::Timeout
        } else {
            warn!("Downstream call failed: {}", err);
            CallOutcome::Fault(Fault::transport(err.to_string()))
        }
    }
}

#[async_trait::async_trait]
impl Downstream for DownstreamClient {
    type Output = DownstreamResponse;

    async fn invoke(&self, cancel: CancellationToken) -> CallOutcome<DownstreamResponse> {
        tokio::select! {
            _ = cancel.cancelled() => CallOutcome::Fault(Fault::other("call cancelled")),
            outcome = self.get() => outcome,
        }
    }
}
