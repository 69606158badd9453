// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use crate::ble::ids::{CharacteristicId, PeripheralAddress};
use crate::ble::{BleBackend, BleConnection};
use crate::error::{ConnectError, IoError};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Owns the link to one peripheral.
///
/// At most one connection handle is live at a time. Reads and writes
/// connect on demand; a failed read or write drops the handle so the next
/// call starts from a fresh link.
pub struct TransportSession {
    address: PeripheralAddress,
    backend: Box<dyn BleBackend>,
    connection: Option<Box<dyn BleConnection>>,
    connect_timeout: Duration,
}

impl TransportSession {
    pub fn new(address: PeripheralAddress, backend: Box<dyn BleBackend>) -> Self {
        Self {
            address,
            backend,
            connection: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn address(&self) -> &PeripheralAddress {
        &self.address
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Whether a connection handle is currently held.
    pub fn has_handle(&self) -> bool {
        self.connection.is_some()
    }

    /// Connect if not already connected. No-op on a live link.
    pub async fn connect(&mut self, timeout: Duration) -> Result<(), ConnectError> {
        if let Some(conn) = self.connection.as_ref() {
            if conn.is_connected().await {
                return Ok(());
            }
            debug!("Link to {} went away, reconnecting", self.address);
            self.connection = None;
        }

        debug!(
            "Connecting to {} via {} (timeout {:?})",
            self.address,
            self.backend.name(),
            timeout
        );
        let conn = match time::timeout(timeout, self.backend.connect(&self.address, timeout)).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ConnectError::Timeout(timeout)),
        };
        info!("Connected to {}", self.address);
        self.connection = Some(conn);
        Ok(())
    }

    pub async fn write(&mut self, characteristic: CharacteristicId, data: &[u8]) -> Result<(), IoError> {
        let conn = self.ensure_connected().await?;
        let result = conn.write(characteristic, data).await;
        if let Err(e) = &result {
            debug!("Write to {} failed: {}", characteristic, e);
            self.invalidate().await;
        }
        result
    }

    pub async fn read(&mut self, characteristic: CharacteristicId) -> Result<Vec<u8>, IoError> {
        let conn = self.ensure_connected().await?;
        let result = conn.read(characteristic).await;
        if let Err(e) = &result {
            debug!("Read from {} failed: {}", characteristic, e);
            self.invalidate().await;
        }
        result
    }

    /// Release the link. Safe to call repeatedly or when never connected.
    pub async fn disconnect(&mut self) {
        let Some(mut conn) = self.connection.take() else {
            return;
        };
        match conn.disconnect().await {
            Ok(()) => info!("Disconnected from {}", self.address),
            Err(e) => warn!("Disconnect from {} failed: {}", self.address, e),
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut Box<dyn BleConnection>, IoError> {
        self.connect(self.connect_timeout).await?;
        self.connection
            .as_mut()
            .ok_or_else(|| IoError::LinkLost(format!("no handle for {}", self.address)))
    }

    async fn invalidate(&mut self) {
        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.disconnect().await {
                debug!("Dropping broken link to {}: {}", self.address, e);
            }
        }
    }
}
