// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Host Bluetooth adapter backend built on btleplug.

use std::time::Duration;

use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{debug, warn};

use solem_core::ble::ids::SOLEM_COMPANY_ID;
use solem_core::{
    BleBackend, BleConnection, BleFuture, CharacteristicId, ConnectError, DynResult, IoError,
    PeripheralAddress,
};

use crate::lookup::{wait_until_found, ScanGuard};
use crate::DiscoveredDevice;

/// How often the adapter's peripheral list is re-checked while scanning
/// for a target.
const LOOKUP_INTERVAL: Duration = Duration::from_millis(250);

async fn default_adapter() -> Result<Adapter, btleplug::Error> {
    let manager = Manager::new().await?;
    manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| btleplug::Error::Other("no Bluetooth adapter found".into()))
}

pub struct BtleplugBackend {
    adapter: Mutex<Option<Adapter>>,
}

impl BtleplugBackend {
    pub fn new() -> Self {
        Self {
            adapter: Mutex::new(None),
        }
    }

    async fn adapter(&self) -> Result<Adapter, ConnectError> {
        let mut slot = self.adapter.lock().await;
        if let Some(adapter) = slot.as_ref() {
            return Ok(adapter.clone());
        }
        let adapter = default_adapter().await.map_err(unreachable)?;
        *slot = Some(adapter.clone());
        Ok(adapter)
    }

    /// Scan until `address` shows up or `timeout` elapses. The scan is
    /// stopped on every exit, including when the caller drops the future.
    async fn find(
        adapter: &Adapter,
        address: &PeripheralAddress,
        timeout: Duration,
    ) -> Result<Peripheral, ConnectError> {
        if let Some(found) = lookup(adapter, address).await? {
            return Ok(found);
        }
        adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(unreachable)?;
        let guard = ScanGuard::new({
            let adapter = adapter.clone();
            move || {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move { stop_scan(&adapter).await });
                }
            }
        });

        let result =
            wait_until_found(timeout, LOOKUP_INTERVAL, || lookup(adapter, address)).await;
        guard.disarm();
        stop_scan(adapter).await;
        result
    }
}

impl Default for BtleplugBackend {
    fn default() -> Self {
        Self::new()
    }
}

async fn lookup(adapter: &Adapter, address: &PeripheralAddress) -> Result<Option<Peripheral>, ConnectError> {
    let peripherals = adapter.peripherals().await.map_err(unreachable)?;
    Ok(peripherals
        .into_iter()
        .find(|p| address.matches(&p.address().to_string())))
}

async fn stop_scan(adapter: &Adapter) {
    if let Err(e) = adapter.stop_scan().await {
        debug!("stop_scan failed: {}", e);
    }
}

fn unreachable(err: btleplug::Error) -> ConnectError {
    ConnectError::Unreachable(err.to_string())
}

impl BleBackend for BtleplugBackend {
    fn name(&self) -> &str {
        "btleplug"
    }

    fn connect<'a>(
        &'a self,
        address: &'a PeripheralAddress,
        timeout: Duration,
    ) -> BleFuture<'a, Result<Box<dyn BleConnection>, ConnectError>> {
        Box::pin(async move {
            let adapter = self.adapter().await?;
            let peripheral = Self::find(&adapter, address, timeout).await?;
            if !peripheral.is_connected().await.unwrap_or(false) {
                peripheral.connect().await.map_err(unreachable)?;
            }
            if let Err(e) = peripheral.discover_services().await {
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    debug!("Disconnect after failed discovery: {}", disconnect_err);
                }
                return Err(unreachable(e));
            }
            Ok(Box::new(BtleplugConnection { peripheral }) as Box<dyn BleConnection>)
        })
    }
}

struct BtleplugConnection {
    peripheral: Peripheral,
}

impl BtleplugConnection {
    fn find_characteristic(&self, id: CharacteristicId) -> Option<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == id.uuid())
    }
}

impl BleConnection for BtleplugConnection {
    fn is_connected<'a>(&'a self) -> BleFuture<'a, bool> {
        Box::pin(async move { self.peripheral.is_connected().await.unwrap_or(false) })
    }

    fn write<'a>(
        &'a mut self,
        characteristic: CharacteristicId,
        data: &'a [u8],
    ) -> BleFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let rejected = |reason: String| IoError::WriteRejected {
                characteristic,
                reason,
            };
            let target = self
                .find_characteristic(characteristic)
                .ok_or_else(|| rejected("characteristic not exposed by peripheral".to_string()))?;
            self.peripheral
                .write(&target, data, WriteType::WithResponse)
                .await
                .map_err(|e| rejected(e.to_string()))
        })
    }

    fn read<'a>(
        &'a mut self,
        characteristic: CharacteristicId,
    ) -> BleFuture<'a, Result<Vec<u8>, IoError>> {
        Box::pin(async move {
            let rejected = |reason: String| IoError::ReadRejected {
                characteristic,
                reason,
            };
            let target = self
                .find_characteristic(characteristic)
                .ok_or_else(|| rejected("characteristic not exposed by peripheral".to_string()))?;
            self.peripheral
                .read(&target)
                .await
                .map_err(|e| rejected(e.to_string()))
        })
    }

    fn disconnect<'a>(&'a mut self) -> BleFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            self.peripheral
                .disconnect()
                .await
                .map_err(|e| IoError::LinkLost(e.to_string()))
        })
    }
}

/// Scan for `duration` and report every peripheral seen, flagging those
/// that advertise the Solem company identifier.
pub async fn scan(duration: Duration) -> DynResult<Vec<DiscoveredDevice>> {
    let adapter = default_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await?;
    time::sleep(duration).await;

    let mut devices = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let props = match peripheral.properties().await {
            Ok(Some(props)) => props,
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping {}: {}", peripheral.address(), e);
                continue;
            }
        };
        devices.push(DiscoveredDevice {
            name: props.local_name.unwrap_or_else(|| "Unknown".to_string()),
            address: peripheral.address().to_string(),
            rssi: props.rssi,
            is_solem: props.manufacturer_data.contains_key(&SOLEM_COMPANY_ID),
        });
    }

    stop_scan(&adapter).await;
    devices.sort_by(|a, b| b.is_solem.cmp(&a.is_solem).then(b.rssi.cmp(&a.rssi)));
    Ok(devices)
}
