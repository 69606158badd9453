// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded peripheral lookup while an adapter scan is running.

use std::future::Future;
use std::time::Duration;

use tokio::time;

use solem_core::ConnectError;

/// Re-run `lookup` every `interval` until it finds something, fails, or
/// `timeout` elapses.
pub(crate) async fn wait_until_found<T, L, Fut>(
    timeout: Duration,
    interval: Duration,
    mut lookup: L,
) -> Result<T, ConnectError>
where
    L: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, ConnectError>>,
{
    let search = async {
        loop {
            if let Some(found) = lookup().await? {
                return Ok::<T, ConnectError>(found);
            }
            time::sleep(interval).await;
        }
    };
    match time::timeout(timeout, search).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::Timeout(timeout)),
    }
}

/// Runs its cleanup when dropped unless disarmed first. Covers the case
/// where the caller abandons a connect mid-scan.
pub(crate) struct ScanGuard<F: FnOnce()> {
    on_drop: Option<F>,
}

impl<F: FnOnce()> ScanGuard<F> {
    pub(crate) fn new(on_drop: F) -> Self {
        Self {
            on_drop: Some(on_drop),
        }
    }

    /// The caller stops the scan itself.
    pub(crate) fn disarm(mut self) {
        self.on_drop = None;
    }
}

impl<F: FnOnce()> Drop for ScanGuard<F> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(250);

    #[tokio::test(start_paused = true)]
    async fn test_found_after_a_few_lookups() {
        let calls = AtomicU32::new(0);
        let found = wait_until_found(Duration::from_secs(5), INTERVAL, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok((n == 2).then_some("peripheral")) }
        })
        .await;

        assert_eq!(found, Ok("peripheral"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_times_out() {
        let start = Instant::now();
        let result: Result<(), _> =
            wait_until_found(Duration::from_secs(2), INTERVAL, || async { Ok(None) }).await;

        assert_eq!(result, Err(ConnectError::Timeout(Duration::from_secs(2))));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_error_ends_the_wait() {
        let result: Result<(), _> = wait_until_found(Duration::from_secs(5), INTERVAL, || async {
            Err(ConnectError::Unreachable("adapter gone".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ConnectError::Unreachable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_scan_runs_cleanup() {
        let stopped = Arc::new(AtomicBool::new(false));
        let scan = {
            let stopped = Arc::clone(&stopped);
            async move {
                let _guard = ScanGuard::new(move || stopped.store(true, Ordering::SeqCst));
                wait_until_found::<(), _, _>(Duration::from_secs(60), INTERVAL, || async {
                    Ok(None)
                })
                .await
            }
        };

        assert!(time::timeout(Duration::from_secs(1), scan).await.is_err());
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_disarmed_guard_does_nothing() {
        let stopped = AtomicBool::new(false);
        ScanGuard::new(|| stopped.store(true, Ordering::SeqCst)).disarm();
        assert!(!stopped.load(Ordering::SeqCst));
    }
}
