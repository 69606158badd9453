// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! BLE link abstraction.
//!
//! A [`BleBackend`] knows how to reach a peripheral; each successful connect
//! yields a [`BleConnection`] handle that carries reads and writes until it
//! is disconnected.

pub mod ids;
pub mod session;
pub mod sim;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::{ConnectError, IoError};
use ids::{CharacteristicId, PeripheralAddress};

pub type BleFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait BleBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Establish a link. `timeout` is advisory; the session enforces it.
    fn connect<'a>(
        &'a self,
        address: &'a PeripheralAddress,
        timeout: Duration,
    ) -> BleFuture<'a, Result<Box<dyn BleConnection>, ConnectError>>;
}

pub trait BleConnection: Send + Sync {
    fn is_connected<'a>(&'a self) -> BleFuture<'a, bool>;

    fn write<'a>(
        &'a mut self,
        characteristic: CharacteristicId,
        data: &'a [u8],
    ) -> BleFuture<'a, Result<(), IoError>>;

    fn read<'a>(
        &'a mut self,
        characteristic: CharacteristicId,
    ) -> BleFuture<'a, Result<Vec<u8>, IoError>>;

    fn disconnect<'a>(&'a mut self) -> BleFuture<'a, Result<(), IoError>>;
}
