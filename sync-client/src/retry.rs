//! Retry executor for remote calls.
//!
//! Wraps a fallible async operation with the exponential backoff of a
//! [`RetryPolicy`]. Only transient failures (network and server errors) are
//! retried; everything else is returned on the first attempt.
//!
//! # Example
//!
//! ```ignore
//! let executor = RetryExecutor::new(RetryPolicy::standard());
//! let chats = executor.run(|| remote.chats()).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use sync_core::RetryPolicy;
use sync_types::RemoteError;

/// Runs operations under a retry policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor for `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.run_with(op, |_, _, _| {}).await
    }

    /// Like [`run`](Self::run), calling `on_retry(attempt, delay, error)`
    /// before each backoff sleep. `attempt` is the 1-based attempt that failed.
    pub async fn run_with<T, F, Fut, C>(&self, mut op: F, mut on_retry: C) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
        C: FnMut(u32, Duration, &RemoteError),
    {
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && self.policy.allows_retry(attempt) => {
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        ?delay,
                        %error,
                        "remote call failed, retrying"
                    );
                    on_retry(attempt, delay, &error);
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => {
                    if error.is_retryable() {
                        tracing::debug!(attempt, %error, "retries exhausted");
                    }
                    return Err(error);
                }
            }
        }
    }
}
