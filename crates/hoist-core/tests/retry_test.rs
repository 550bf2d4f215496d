use hoist_core::{RetryError, RetryPolicy, retry};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
enum FakeError {
    #[error("no active session")]
    Transient,
    #[error("bad Dockerfile")]
    Fatal,
}

fn fixed(attempts: u32) -> RetryPolicy {
    RetryPolicy::Fixed {
        attempts,
        delay: Duration::from_secs(5),
    }
}

#[tokio::test(start_paused = true)]
async fn succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let result = retry(
        &fixed(3),
        &CancellationToken::new(),
        |e| matches!(e, FakeError::Transient),
        |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(FakeError::Transient)
                } else {
                    Ok(attempt)
                }
            }
        },
    )
    .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausts_after_max_attempts() {
    let result: Result<(), _> = retry(
        &fixed(3),
        &CancellationToken::new(),
        |_| true,
        |_| async { Err(FakeError::Transient) },
    )
    .await;

    match result {
        Err(RetryError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn fatal_errors_are_not_retried() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = retry(
        &fixed(3),
        &CancellationToken::new(),
        |e| matches!(e, FakeError::Transient),
        |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FakeError::Fatal) }
        },
    )
    .await;

    assert!(matches!(result, Err(RetryError::Fatal(FakeError::Fatal))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn exponential_backoff_is_bounded_by_elapsed_time() {
    let policy = RetryPolicy::ExponentialBackoff {
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(60),
        max_elapsed: Duration::from_secs(180),
    };
    let start = tokio::time::Instant::now();

    let result: Result<(), _> = retry(
        &policy,
        &CancellationToken::new(),
        |_| true,
        |_| async { Err(FakeError::Transient) },
    )
    .await;

    assert!(matches!(result, Err(RetryError::Exhausted { .. })));
    assert!(start.elapsed() <= Duration::from_secs(180));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_wait() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result: Result<(), _> = retry(
        &fixed(3),
        &cancel,
        |_| true,
        |_| async { Err(FakeError::Transient) },
    )
    .await;

    assert!(matches!(result, Err(RetryError::Cancelled)));
}
