//! Constant-delay retry bounded by elapsed time.
//!
//! Used to ride out IAM propagation delay: a freshly created access key can
//! take several seconds before it authenticates.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::constants::{KEY_PROPAGATION_MAX_WAIT, KEY_PROPAGATION_RETRY_DELAY};
use crate::error::RetryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wall time, measured from the first attempt, after which no new attempt
    /// is started
    pub max_elapsed: Duration,
    /// Fixed sleep between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_elapsed: KEY_PROPAGATION_MAX_WAIT,
            delay: KEY_PROPAGATION_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_elapsed: Duration, delay: Duration) -> Self {
        Self { max_elapsed, delay }
    }
}

/// Run `operation` until it succeeds.
///
/// After a failure another attempt is made only if it would start before
/// `max_elapsed` has passed since the first attempt. The wait between attempts
/// is interrupted by `cancel`; an attempt already in flight is not.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let last = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if started.elapsed() + policy.delay >= policy.max_elapsed {
            return Err(RetryError::Exhausted { attempts, last });
        }

        warn!(
            attempt = attempts,
            delay_secs = policy.delay.as_secs_f64(),
            error = %last,
            "Retrying after error"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled { attempts, last }),
            _ = sleep(policy.delay) => {}
        }
    }
}
