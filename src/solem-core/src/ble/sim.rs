// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-memory peripheral used by the `dummy` backend and by tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time;

use crate::ble::ids::{CharacteristicId, GattProfile, PeripheralAddress};
use crate::ble::{BleBackend, BleConnection, BleFuture};
use crate::error::{ConnectError, IoError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Write(CharacteristicId, Vec<u8>),
    Read(CharacteristicId),
    Disconnected,
}

#[derive(Debug, Default)]
struct SimState {
    address: Option<PeripheralAddress>,
    values: HashMap<CharacteristicId, Vec<u8>>,
    writable: HashSet<CharacteristicId>,
    events: Vec<LinkEvent>,
    connected: bool,
    generation: u64,
    connect_count: u32,
    unreachable: bool,
    connect_failures: u32,
    write_failures: u32,
    read_failures: u32,
    connect_delay: Duration,
    op_delay: Duration,
    in_flight: u32,
    max_in_flight: u32,
}

/// Scriptable peripheral. Clones share state, so a test can keep one handle
/// while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPeripheral {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedPeripheral {
    pub fn new() -> Self {
        Self::default()
    }

    /// A controller that accepts commands and reports a full battery, idle.
    pub fn for_profile(profile: &GattProfile) -> Self {
        let sim = Self::new();
        {
            let mut state = sim.state();
            state.writable.insert(profile.command);
            state.values.insert(profile.battery, vec![100]);
            state.values.insert(profile.state, vec![0]);
        }
        sim
    }

    /// Only answer connects for `address`.
    pub fn bind_to(&self, address: PeripheralAddress) {
        self.state().address = Some(address);
    }

    pub fn set_value(&self, characteristic: CharacteristicId, value: Vec<u8>) {
        self.state().values.insert(characteristic, value);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state().connect_failures = count;
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.state().write_failures = count;
    }

    pub fn fail_next_reads(&self, count: u32) {
        self.state().read_failures = count;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = delay;
    }

    /// Time each read or write spends on the air.
    pub fn set_op_delay(&self, delay: Duration) {
        self.state().op_delay = delay;
    }

    /// Peripheral-initiated disconnect.
    pub fn drop_link(&self) {
        let mut state = self.state();
        if state.connected {
            state.connected = false;
            state.events.push(LinkEvent::Disconnected);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn connect_count(&self) -> u32 {
        self.state().connect_count
    }

    /// Highest number of reads/writes observed in flight at once.
    pub fn max_in_flight(&self) -> u32 {
        self.state().max_in_flight
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        self.state().events.clone()
    }

    pub fn writes(&self) -> Vec<(CharacteristicId, Vec<u8>)> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                LinkEvent::Write(ch, data) => Some((*ch, data.clone())),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl BleBackend for SimulatedPeripheral {
    fn name(&self) -> &str {
        "dummy"
    }

    fn connect<'a>(
        &'a self,
        address: &'a PeripheralAddress,
        _timeout: Duration,
    ) -> BleFuture<'a, Result<Box<dyn BleConnection>, ConnectError>> {
        Box::pin(async move {
            let delay = {
                let mut state = self.state();
                if state.unreachable {
                    return Err(ConnectError::Unreachable(format!("{} is out of range", address)));
                }
                if let Some(bound) = &state.address {
                    if bound != address {
                        return Err(ConnectError::Unreachable(format!("no peripheral at {}", address)));
                    }
                }
                if state.connect_failures > 0 {
                    state.connect_failures -= 1;
                    return Err(ConnectError::Unreachable("connection refused".to_string()));
                }
                state.connect_delay
            };
            if !delay.is_zero() {
                time::sleep(delay).await;
            }

            let mut state = self.state();
            state.connected = true;
            state.generation += 1;
            state.connect_count += 1;
            state.events.push(LinkEvent::Connected);
            Ok(Box::new(SimConnection {
                shared: Arc::clone(&self.state),
                generation: state.generation,
            }) as Box<dyn BleConnection>)
        })
    }
}

struct SimConnection {
    shared: Arc<Mutex<SimState>>,
    generation: u64,
}

impl SimConnection {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live(&self, state: &SimState) -> bool {
        state.connected && state.generation == self.generation
    }

    /// Mark an operation in flight and return how long it takes.
    fn begin(&self) -> Result<(InFlight, Duration), IoError> {
        let mut state = self.state();
        if !self.live(&state) {
            return Err(IoError::LinkLost("peripheral disconnected".to_string()));
        }
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        Ok((InFlight(Arc::clone(&self.shared)), state.op_delay))
    }
}

struct InFlight(Arc<Mutex<SimState>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.0.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}

impl BleConnection for SimConnection {
    fn is_connected<'a>(&'a self) -> BleFuture<'a, bool> {
        Box::pin(async move {
            let state = self.state();
            self.live(&state)
        })
    }

    fn write<'a>(
        &'a mut self,
        characteristic: CharacteristicId,
        data: &'a [u8],
    ) -> BleFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let (_guard, delay) = self.begin()?;
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            let mut state = self.state();
            if state.write_failures > 0 {
                state.write_failures -= 1;
                return Err(IoError::WriteRejected {
                    characteristic,
                    reason: "ATT error 0x0e".to_string(),
                });
            }
            if !state.writable.contains(&characteristic) {
                return Err(IoError::WriteRejected {
                    characteristic,
                    reason: "characteristic not writable".to_string(),
                });
            }
            state.events.push(LinkEvent::Write(characteristic, data.to_vec()));
            Ok(())
        })
    }

    fn read<'a>(
        &'a mut self,
        characteristic: CharacteristicId,
    ) -> BleFuture<'a, Result<Vec<u8>, IoError>> {
        Box::pin(async move {
            let (_guard, delay) = self.begin()?;
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            let mut state = self.state();
            if state.read_failures > 0 {
                state.read_failures -= 1;
                return Err(IoError::ReadRejected {
                    characteristic,
                    reason: "ATT error 0x0e".to_string(),
                });
            }
            let value = state.values.get(&characteristic).cloned().ok_or_else(|| {
                IoError::ReadRejected {
                    characteristic,
                    reason: "characteristic not readable".to_string(),
                }
            })?;
            state.events.push(LinkEvent::Read(characteristic));
            Ok(value)
        })
    }

    fn disconnect<'a>(&'a mut self) -> BleFuture<'a, Result<(), IoError>> {
        Box::pin(async move {
            let mut state = self.state();
            if self.live(&state) {
                state.connected = false;
                state.events.push(LinkEvent::Disconnected);
            }
            Ok(())
        })
    }
}
