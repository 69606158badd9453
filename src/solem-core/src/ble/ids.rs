// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Identifiers for peripherals and GATT characteristics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Bluetooth SIG base UUID `00000000-0000-1000-8000-00805f9b34fb`.
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const SHORT_UUID_MASK: u128 = 0xffff_ffff_u128 << 96;

/// Command characteristic exposed by current Solem firmware.
pub const COMMAND_CHARACTERISTIC: CharacteristicId =
    CharacteristicId::from_u128(0x108b_0002_eab5_bc09_d0ea_0b8f_467c_e8ee);
/// Standard GATT battery level characteristic.
pub const BATTERY_LEVEL_CHARACTERISTIC: CharacteristicId = CharacteristicId::from_short(0x2a19);
/// Vendor watering state characteristic.
pub const WATERING_STATE_CHARACTERISTIC: CharacteristicId = CharacteristicId::from_short(0xa003);

/// Bluetooth SIG company identifier assigned to Solem.
pub const SOLEM_COMPANY_ID: u16 = 0x079e;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("peripheral address must not be empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid characteristic id '{0}'")]
pub struct CharacteristicError(String);

/// Opaque peripheral address.
///
/// MAC-style addresses are upper-cased with `:` separators so that
/// `aa-bb-cc-dd-ee-ff` and `AA:BB:CC:DD:EE:FF` compare equal. Anything
/// else (platform UUIDs, for instance) is kept as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralAddress(String);

impl PeripheralAddress {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AddressError::Empty);
        }
        Ok(Self(normalize_address(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an address reported by an adapter names this peripheral.
    pub fn matches(&self, reported: &str) -> bool {
        self.0 == normalize_address(reported.trim())
    }
}

fn normalize_address(raw: &str) -> String {
    if looks_like_mac(raw) {
        raw.to_ascii_uppercase().replace('-', ":")
    } else {
        raw.to_string()
    }
}

fn looks_like_mac(raw: &str) -> bool {
    let octets: Vec<&str> = raw.split([':', '-']).collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

impl fmt::Display for PeripheralAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeripheralAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PeripheralAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PeripheralAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// 128-bit GATT characteristic identifier.
///
/// Accepts 16/32-bit short forms (`2a19`, `0xa003`), which expand against the
/// Bluetooth base UUID, or a full hyphenated UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicId(Uuid);

impl CharacteristicId {
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub const fn from_short(short: u32) -> Self {
        Self::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
    }

    pub fn parse(raw: &str) -> Result<Self, CharacteristicError> {
        let trimmed = raw.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if matches!(hex.len(), 4 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return u32::from_str_radix(hex, 16)
                .map(Self::from_short)
                .map_err(|_| CharacteristicError(raw.to_string()));
        }
        Uuid::parse_str(trimmed)
            .map(Self)
            .map_err(|_| CharacteristicError(raw.to_string()))
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Short form, when this id sits on the Bluetooth base UUID.
    pub fn short(&self) -> Option<u32> {
        let value = self.0.as_u128();
        if value & !SHORT_UUID_MASK == BLUETOOTH_BASE_UUID {
            Some((value >> 96) as u32)
        } else {
            None
        }
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for CharacteristicId {
    type Err = CharacteristicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for CharacteristicId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CharacteristicId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The three characteristics a controller is driven through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GattProfile {
    pub command: CharacteristicId,
    pub battery: CharacteristicId,
    pub state: CharacteristicId,
}

impl Default for GattProfile {
    fn default() -> Self {
        Self {
            command: COMMAND_CHARACTERISTIC,
            battery: BATTERY_LEVEL_CHARACTERISTIC,
            state: WATERING_STATE_CHARACTERISTIC,
        }
    }
}
