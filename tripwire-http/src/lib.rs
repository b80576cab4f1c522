//! HTTP downstream client for Tripwire
//!
//! [`DownstreamClient`] performs one GET against the configured downstream
//! endpoint and reports the result as a [`CallOutcome`](tripwire_resilience::CallOutcome),
//! so it can be run under a [`ResiliencePipeline`](tripwire_resilience::ResiliencePipeline).

pub mod client;
pub mod errors;

// Re-export main types for convenience
pub use client::{DownstreamClient, DownstreamResponse};
pub use errors::HttpError;
