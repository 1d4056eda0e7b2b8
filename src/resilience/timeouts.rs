//! Timeout enforcement for worker control calls.
//!
//! A single unresponsive worker must not hang a whole save-and-apply cycle,
//! so every call is wrapped in its own deadline.

use std::future::Future;
use std::time::Duration;

use crate::workers::{WorkerError, WorkerId};

/// Run a worker control call under `deadline`, mapping expiry to
/// `WorkerError::Timeout`.
pub async fn with_deadline<T, Fut>(worker: &WorkerId, deadline: Duration, call: Fut) -> Result<T, WorkerError>
where
    Fut: Future<Output = Result<T, WorkerError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::Timeout {
            id: worker.clone(),
            after_ms: deadline.as_millis() as u64,
        }),
    }
}
