// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;

use serde::Serialize;
use solem_core::{BleBackend, DynResult, GattProfile, SimulatedPeripheral};

#[cfg(feature = "btleplug")]
mod btle;
#[cfg(any(feature = "btleplug", test))]
mod lookup;

#[cfg(feature = "btleplug")]
pub use btle::{scan, BtleplugBackend};

pub type BackendFactory = fn(&GattProfile) -> DynResult<Box<dyn BleBackend>>;

/// A peripheral seen while scanning.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    /// Advertises the Solem company identifier.
    pub is_solem: bool,
}

/// Named BLE backend factories.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "btleplug").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(normalize_name(name), factory);
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn build_backend(&self, name: &str, profile: &GattProfile) -> DynResult<Box<dyn BleBackend>> {
        let factory = self.factories.get(&normalize_name(name)).ok_or_else(|| {
            format!(
                "Unknown BLE backend: {} (available: {})",
                name,
                self.registered_backends().join(", ")
            )
        })?;
        factory(profile)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-case and strip everything but ASCII alphanumerics.
pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Register all built-in backends enabled by features on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("dummy", dummy_factory);
    #[cfg(feature = "btleplug")]
    context.register_backend("btleplug", btleplug_factory);
}

/// In-memory controller: accepts every command, reports 87% battery, idle.
fn dummy_factory(profile: &GattProfile) -> DynResult<Box<dyn BleBackend>> {
    let sim = SimulatedPeripheral::for_profile(profile);
    sim.set_value(profile.battery, vec![87]);
    Ok(Box::new(sim))
}

#[cfg(feature = "btleplug")]
fn btleplug_factory(_profile: &GattProfile) -> DynResult<Box<dyn BleBackend>> {
    Ok(Box::new(BtleplugBackend::new()))
}
