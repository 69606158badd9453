// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Periodic status polling for `solem watch`.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn};

use solem_core::controller::{AdaptivePolling, PollingPolicy};
use solem_core::{CancelToken, DeviceState, PollError, SolemClient};

/// Poll the controller until `cancel` fires, publishing every outcome on
/// `state_tx`. A message on `refresh_rx` triggers an immediate poll.
pub async fn run_poll_task(
    client: Arc<SolemClient>,
    polling: AdaptivePolling,
    refresh_rx: mpsc::Receiver<()>,
    state_tx: watch::Sender<DeviceState>,
    cancel: CancelToken,
) {
    let mut refresh_rx = Some(refresh_rx);
    let mut state = state_tx.borrow().clone();

    loop {
        let result = client.poll_with_cancel(&cancel).await;
        if matches!(result, Err(PollError::Cancelled)) {
            break;
        }

        let flipped = state.apply_poll(&result);
        match &result {
            Ok(snapshot) if flipped => info!(
                "{} available (battery {}%, watering: {})",
                client.address(),
                snapshot.battery_percent,
                snapshot.is_watering
            ),
            Ok(_) => {}
            Err(e) if flipped => warn!("{} unavailable: {}", client.address(), e),
            Err(e) => debug!(
                "{} still unavailable ({} failures): {}",
                client.address(),
                state.consecutive_failures,
                e
            ),
        }
        state_tx.send_replace(state.clone());

        let interval = polling.interval(state.is_watering());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = next_refresh(&mut refresh_rx) => debug!("Refresh requested"),
            _ = time::sleep(interval) => {}
        }
    }
    debug!("Poll task for {} stopped", client.address());
}

/// Resolves on the next refresh request, coalescing any already queued.
/// Pending forever once every sender is gone.
async fn next_refresh(rx: &mut Option<mpsc::Receiver<()>>) {
    let Some(inner) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if inner.recv().await.is_none() {
        *rx = None;
        return std::future::pending().await;
    }
    while inner.try_recv().is_ok() {}
}
