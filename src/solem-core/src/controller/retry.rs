// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time;
use tracing::{debug, error, warn};

use crate::controller::cancel::CancelToken;
use crate::controller::policies::RetryPolicy;
use crate::error::RetryError;

/// Error classification consulted by retry policies.
pub trait Retryable {
    fn is_transient(&self) -> bool {
        true
    }

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Progress of one retried operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub next_delay: Duration,
}

impl RetryState {
    fn new(policy: &dyn RetryPolicy) -> Self {
        Self {
            attempt: 0,
            next_delay: policy.delay(0),
        }
    }

    /// Record a failed attempt and return the wait before the next one.
    fn record_failure(&mut self, policy: &dyn RetryPolicy) -> Duration {
        let wait = self.next_delay;
        self.next_delay = policy.delay(self.attempt);
        wait
    }
}

/// Run `operation` until it succeeds, the policy gives up, or `cancel`
/// fires. Cancellation is honoured both mid-attempt and during back-off.
pub async fn retry<T, E, F, Fut>(
    label: &str,
    policy: &dyn RetryPolicy,
    cancel: &CancelToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let mut state = RetryState::new(policy);
    let max_attempts = policy.max_attempts();

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        state.attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };
        let err = match outcome {
            Ok(value) => {
                if state.attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, state.attempt);
                }
                return Ok(value);
            }
            Err(e) => e,
        };
        if err.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        if !policy.should_retry(state.attempt, &err) {
            error!("{} failed after {} attempt(s): {}", label, state.attempt, err);
            return Err(RetryError::Exhausted {
                attempts: state.attempt,
                source: err,
            });
        }

        let wait = state.record_failure(policy);
        warn!(
            "{} failed: {} (attempt {} of {}, retrying in {:?})",
            label, err, state.attempt, max_attempts, wait
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = time::sleep(wait) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::cancel::cancel_pair;
    use crate::controller::policies::ExponentialBackoff;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    fn policy(max_attempts: u32) -> ExponentialBackoff {
        ExponentialBackoff::new(max_attempts, Duration::from_secs(1), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_until_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry("op", &policy(5), &CancelToken::never(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(TestError::Flaky)
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_exactly_max_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry("op", &policy(3), &CancelToken::never(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Flaky)
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 3,
                source: TestError::Flaky
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_stops_early() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry("op", &policy(3), &CancelToken::never(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError::Fatal)
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().attempts(), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let (handle, token) = cancel_pair();
        let start = Instant::now();

        let task = tokio::spawn({
            let calls = Arc::clone(&calls);
            async move {
                retry("op", &policy(3), &token, || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(TestError::Flaky)
                    }
                })
                .await
            }
        });

        // First attempt fails at t=0, back-off runs until t=1s.
        time::sleep(Duration::from_millis(500)).await;
        handle.cancel();

        let result = task.await.unwrap();
        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_attempt() {
        let (handle, token) = cancel_pair();
        let start = Instant::now();

        let task = tokio::spawn(async move {
            retry("op", &policy(3), &token, || async {
                time::sleep(Duration::from_secs(60)).await;
                Ok::<_, TestError>(())
            })
            .await
        });

        time::sleep(Duration::from_secs(2)).await;
        handle.cancel();

        assert_eq!(task.await.unwrap(), Err(RetryError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_already_cancelled_runs_nothing() {
        let (handle, token) = cancel_pair();
        handle.cancel();
        let calls = AtomicU32::new(0);

        let result = retry("op", &policy(3), &token, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TestError>(())
        })
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
