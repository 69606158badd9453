// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::error::PollError;
use crate::status::StatusSnapshot;

/// Last known device status as published to observers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub address: String,
    pub available: bool,
    pub snapshot: Option<StatusSnapshot>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Unix seconds of the last completed poll.
    pub updated_at: Option<u64>,
}

impl DeviceState {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Fold a poll outcome into the state. Returns `true` when availability
    /// flipped. Cancelled polls leave the state untouched.
    pub fn apply_poll(&mut self, result: &Result<StatusSnapshot, PollError>) -> bool {
        let was_available = self.available;
        match result {
            Ok(snapshot) => {
                self.available = true;
                self.snapshot = Some(*snapshot);
                self.last_error = None;
                self.consecutive_failures = 0;
            }
            Err(PollError::Cancelled) => return false,
            Err(PollError::Unavailable(e)) => {
                self.available = false;
                self.last_error = Some(e.to_string());
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            }
        }
        self.updated_at = Some(unix_now());
        was_available != self.available
    }

    pub fn battery_percent(&self) -> Option<u8> {
        self.available
            .then_some(self.snapshot)
            .flatten()
            .map(|s| s.battery_percent)
    }

    /// Watering as last seen; `false` when there is no fresh snapshot.
    pub fn is_watering(&self) -> bool {
        self.available && self.snapshot.is_some_and(|s| s.is_watering)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
