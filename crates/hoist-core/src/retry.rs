use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// How long to wait between attempts, and when to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// At most `attempts` tries with the same delay between them
    Fixed { attempts: u32, delay: Duration },

    /// Doubling delays capped at `max_delay`, stopping once the next wait
    /// would push total elapsed time past `max_elapsed`
    ExponentialBackoff {
        initial_delay: Duration,
        max_delay: Duration,
        max_elapsed: Duration,
    },
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, or `None` when the budget is spent.
    pub fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        match self {
            Self::Fixed { attempts, delay } => (attempt < *attempts).then_some(*delay),
            Self::ExponentialBackoff {
                initial_delay,
                max_delay,
                max_elapsed,
            } => {
                let exp = attempt.saturating_sub(1).min(16);
                let delay = initial_delay.saturating_mul(1 << exp).min(*max_delay);
                (elapsed + delay <= *max_elapsed).then_some(delay)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    #[error(transparent)]
    Fatal(E),

    #[error("cancelled while waiting to retry")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// The last error returned by the operation, if it ran at all.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::Fatal(source) => Some(source),
            Self::Cancelled => None,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy gives up. `op` receives the 1-based attempt number.
pub async fn retry<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut is_transient: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
{
    let start = Instant::now();
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !is_transient(&err) {
            return Err(RetryError::Fatal(err));
        }
        let Some(delay) = policy.next_delay(attempt, start.elapsed()) else {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                source: err,
            });
        };
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
