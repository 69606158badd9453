// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod ble;
pub mod client;
pub mod command;
pub mod controller;
pub mod error;
pub mod service;
pub mod state;
pub mod status;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use ble::ids::{AddressError, CharacteristicError, CharacteristicId, GattProfile, PeripheralAddress};
pub use ble::session::TransportSession;
pub use ble::sim::SimulatedPeripheral;
pub use ble::{BleBackend, BleConnection, BleFuture};
pub use client::{ClientSettings, SolemClient};
pub use command::{CommandEncoder, CommandPayload, CommitPolicy, IntentKind, SolemCommand};
pub use controller::{cancel_pair, CancelHandle, CancelToken};
pub use error::{CommandError, ConnectError, IoError, PollError, RetryError};
pub use service::{ServiceCall, ServiceError};
pub use state::DeviceState;
pub use status::{StatusPoller, StatusSnapshot};
