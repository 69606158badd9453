// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller client.
//!
//! [`SolemClient`] is the only way to reach the peripheral. Each public
//! operation takes the client gate for its full duration, back-off delays
//! included, so commands and polls never interleave on the link. The gate
//! is a FIFO mutex: operations run in the order they asked for it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::ble::ids::{GattProfile, PeripheralAddress};
use crate::ble::session::{TransportSession, DEFAULT_CONNECT_TIMEOUT};
use crate::ble::BleBackend;
use crate::command::{CommandEncoder, CommitPolicy, SolemCommand};
use crate::controller::{retry, CancelToken, ExponentialBackoff, NoRetry, RetryPolicy};
use crate::error::{CommandError, ConnectError, PollError, RetryError};
use crate::status::{StatusPoller, StatusSnapshot, DEFAULT_POLL_CONNECT_TIMEOUT};

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub profile: GattProfile,
    pub connect_timeout: Duration,
    pub poll_connect_timeout: Duration,
    pub command_retry: Arc<dyn RetryPolicy>,
    pub poll_retry: Arc<dyn RetryPolicy>,
    pub commit: CommitPolicy,
    /// Hold the link between operations instead of releasing it after each.
    pub keep_connected: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            profile: GattProfile::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            poll_connect_timeout: DEFAULT_POLL_CONNECT_TIMEOUT,
            command_retry: Arc::new(ExponentialBackoff::default_commands()),
            poll_retry: Arc::new(NoRetry),
            commit: CommitPolicy::default(),
            keep_connected: true,
        }
    }
}

pub struct SolemClient {
    address: PeripheralAddress,
    gate: Mutex<()>,
    session: Mutex<TransportSession>,
    encoder: CommandEncoder,
    poller: StatusPoller,
    connect_timeout: Duration,
    command_retry: Arc<dyn RetryPolicy>,
    poll_retry: Arc<dyn RetryPolicy>,
    keep_connected: bool,
}

impl SolemClient {
    pub fn new(
        address: PeripheralAddress,
        backend: Box<dyn BleBackend>,
        settings: ClientSettings,
    ) -> Self {
        let session = TransportSession::new(address.clone(), backend)
            .with_connect_timeout(settings.connect_timeout);
        Self {
            address,
            gate: Mutex::new(()),
            session: Mutex::new(session),
            encoder: CommandEncoder::new(settings.profile.command, settings.commit),
            poller: StatusPoller::new(&settings.profile)
                .with_connect_timeout(settings.poll_connect_timeout),
            connect_timeout: settings.connect_timeout,
            command_retry: settings.command_retry,
            poll_retry: settings.poll_retry,
            keep_connected: settings.keep_connected,
        }
    }

    pub fn address(&self) -> &PeripheralAddress {
        &self.address
    }

    /// Whether an operation currently holds the gate.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        let _gate = self.gate.lock().await;
        self.session.lock().await.connect(self.connect_timeout).await
    }

    /// Release the link. Safe to call at any time, any number of times.
    pub async fn disconnect(&self) {
        let _gate = self.gate.lock().await;
        self.session.lock().await.disconnect().await;
    }

    pub async fn poll(&self) -> Result<StatusSnapshot, PollError> {
        self.poll_with_cancel(&CancelToken::never()).await
    }

    pub async fn poll_with_cancel(&self, cancel: &CancelToken) -> Result<StatusSnapshot, PollError> {
        let Some(_gate) = self.acquire(cancel).await else {
            return Err(PollError::Cancelled);
        };
        let session = &self.session;
        let poller = &self.poller;
        let result = retry("status poll", self.poll_retry.as_ref(), cancel, move || async move {
            let mut session = session.lock().await;
            poller.poll_once(&mut session).await
        })
        .await;
        self.release_link().await;

        let snapshot = result?;
        debug!(
            "{}: battery {}%, watering {}",
            self.address, snapshot.battery_percent, snapshot.is_watering
        );
        Ok(snapshot)
    }

    pub async fn send(&self, command: SolemCommand) -> Result<(), CommandError> {
        self.send_with_cancel(command, &CancelToken::never()).await
    }

    pub async fn send_with_cancel(
        &self,
        command: SolemCommand,
        cancel: &CancelToken,
    ) -> Result<(), CommandError> {
        let encoded = self.encoder.encode(&command);
        let Some(_gate) = self.acquire(cancel).await else {
            return Err(RetryError::Cancelled);
        };
        info!("Sending {} to {}", command, self.address);

        let session = &self.session;
        let encoder = &self.encoder;
        let encoded = &encoded;
        let result = retry(
            command.kind().as_str(),
            self.command_retry.as_ref(),
            cancel,
            move || async move {
                let mut session = session.lock().await;
                encoder.dispatch(&mut session, encoded).await
            },
        )
        .await;
        self.release_link().await;
        result
    }

    pub async fn turn_off_permanent(&self) -> Result<(), CommandError> {
        self.send(SolemCommand::TurnOffPermanent).await
    }

    pub async fn turn_off_for_days(&self, days: u8) -> Result<(), CommandError> {
        self.send(SolemCommand::TurnOffForDays { days }).await
    }

    pub async fn turn_on(&self) -> Result<(), CommandError> {
        self.send(SolemCommand::TurnOn).await
    }

    pub async fn sprinkle_station(&self, station: u8, minutes: u8) -> Result<(), CommandError> {
        self.send(SolemCommand::SprinkleStation { station, minutes })
            .await
    }

    pub async fn sprinkle_all(&self, minutes: u8) -> Result<(), CommandError> {
        self.send(SolemCommand::SprinkleAll { minutes }).await
    }

    pub async fn run_program(&self, program: u8) -> Result<(), CommandError> {
        self.send(SolemCommand::RunProgram { program }).await
    }

    pub async fn stop_manual(&self) -> Result<(), CommandError> {
        self.send(SolemCommand::StopManual).await
    }

    async fn acquire(&self, cancel: &CancelToken) -> Option<MutexGuard<'_, ()>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            guard = self.gate.lock() => Some(guard),
        }
    }

    async fn release_link(&self) {
        if !self.keep_connected {
            self.session.lock().await.disconnect().await;
        }
    }
}
