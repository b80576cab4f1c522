//! Abstraction over the remote operation the pipeline protects

use tokio_util::sync::CancellationToken;

use crate::outcome::CallOutcome;

/// A downstream dependency that can be invoked once per attempt.
///
/// Implementations must observe `cancel` for long-running work; the pipeline
/// also drops the returned future when the caller cancels.
#[async_trait::async_trait]
pub trait Downstream: Send + Sync {
    type Output: Send;

    async fn invoke(&self, cancel: CancellationToken) -> CallOutcome<Self::Output>;
}
