//! Bounded retry with exponential backoff and per-attempt timeouts.

use std::future::Future;
use std::time::Duration;

use inventory::InventoryError;
use payment::PaymentError;

/// Errors that can distinguish a retryable failure from a final one.
pub trait Transient {
    /// Returns true if the operation may succeed on retry.
    fn is_transient(&self) -> bool;
}

impl Transient for InventoryError {
    fn is_transient(&self) -> bool {
        InventoryError::is_transient(self)
    }
}

impl Transient for PaymentError {
    fn is_transient(&self) -> bool {
        PaymentError::is_transient(self)
    }
}

/// Retry budget for one outbound call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each retry.
    pub base_delay: Duration,
    /// Per-attempt timeout. A timed-out attempt counts as transient.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            call_timeout: Duration::from_secs(5),
        }
    }
}

/// Why a retried call gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// A business-rule failure; retrying would not help and none was made.
    Permanent(E),
    /// The budget ran out. `last` is None when the final attempt timed out
    /// rather than erroring.
    Exhausted { attempts: u32, last: Option<E> },
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryError::Permanent(e) => write!(f, "{e}"),
            RetryError::Exhausted {
                attempts,
                last: Some(e),
            } => write!(f, "gave up after {attempts} attempts: {e}"),
            RetryError::Exhausted { attempts, last: None } => {
                write!(f, "gave up after {attempts} attempts: timed out")
            }
        }
    }
}

/// Runs `op` under the policy.
///
/// Transient errors and timeouts are retried with exponential backoff;
/// anything else returns immediately as `Permanent`. The budget is small
/// and bounded - exhaustion is reported, never an indefinite block.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last: Option<E> = None;

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            let backoff = policy.base_delay * 2u32.pow(attempt - 2);
            tokio::time::sleep(backoff).await;
        }

        match tokio::time::timeout(policy.call_timeout, op()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_transient() => {
                tracing::warn!(op = op_name, attempt, error = %e, "transient failure, retrying");
                metrics::counter!("saga_call_retries").increment(1);
                last = Some(e);
            }
            Ok(Err(e)) => return Err(RetryError::Permanent(e)),
            Err(_elapsed) => {
                tracing::warn!(op = op_name, attempt, "call timed out, retrying");
                metrics::counter!("saga_call_timeouts").increment(1);
                last = None;
            }
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
        last,
    })
}
