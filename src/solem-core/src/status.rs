// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ble::ids::{CharacteristicId, GattProfile};
use crate::ble::session::TransportSession;
use crate::error::IoError;

pub const DEFAULT_POLL_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Point-in-time controller status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub battery_percent: u8,
    pub is_watering: bool,
}

/// Reads battery level and watering state, in that order.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    battery: CharacteristicId,
    state: CharacteristicId,
    connect_timeout: Duration,
}

impl StatusPoller {
    pub fn new(profile: &GattProfile) -> Self {
        Self {
            battery: profile.battery,
            state: profile.state,
            connect_timeout: DEFAULT_POLL_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// One poll attempt.
    pub async fn poll_once(&self, session: &mut TransportSession) -> Result<StatusSnapshot, IoError> {
        session.connect(self.connect_timeout).await?;
        let battery = session.read(self.battery).await?;
        let raw_battery = first_byte(self.battery, &battery)?;
        let state = session.read(self.state).await?;

        if raw_battery > 100 {
            debug!("Battery level {} out of range, clamping to 100", raw_battery);
        }
        Ok(StatusSnapshot {
            battery_percent: raw_battery.min(100),
            is_watering: first_byte(self.state, &state)? != 0,
        })
    }
}

fn first_byte(characteristic: CharacteristicId, value: &[u8]) -> Result<u8, IoError> {
    value.first().copied().ok_or_else(|| IoError::ReadRejected {
        characteristic,
        reason: "empty value".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::ids::PeripheralAddress;
    use crate::ble::sim::{LinkEvent, SimulatedPeripheral};

    fn setup() -> (GattProfile, SimulatedPeripheral, TransportSession) {
        let profile = GattProfile::default();
        let sim = SimulatedPeripheral::for_profile(&profile);
        let address = PeripheralAddress::parse("AA:BB:CC:DD:EE:FF").unwrap();
        let session = TransportSession::new(address, Box::new(sim.clone()));
        (profile, sim, session)
    }

    #[tokio::test]
    async fn test_poll_reads_battery_then_state() {
        let (profile, sim, mut session) = setup();
        sim.set_value(profile.battery, vec![77]);
        sim.set_value(profile.state, vec![1]);

        let snapshot = StatusPoller::new(&profile).poll_once(&mut session).await.unwrap();

        assert_eq!(
            snapshot,
            StatusSnapshot {
                battery_percent: 77,
                is_watering: true
            }
        );
        assert_eq!(
            sim.events(),
            vec![
                LinkEvent::Connected,
                LinkEvent::Read(profile.battery),
                LinkEvent::Read(profile.state),
            ]
        );
    }

    #[tokio::test]
    async fn test_any_nonzero_state_is_watering() {
        let (profile, sim, mut session) = setup();
        sim.set_value(profile.state, vec![0x80, 0x00]);

        let snapshot = StatusPoller::new(&profile).poll_once(&mut session).await.unwrap();
        assert!(snapshot.is_watering);
    }

    #[tokio::test]
    async fn test_battery_clamped_to_100() {
        let (profile, sim, mut session) = setup();
        sim.set_value(profile.battery, vec![250]);

        let snapshot = StatusPoller::new(&profile).poll_once(&mut session).await.unwrap();
        assert_eq!(snapshot.battery_percent, 100);
    }

    #[tokio::test]
    async fn test_empty_value_is_an_error() {
        let (profile, sim, mut session) = setup();
        sim.set_value(profile.battery, Vec::new());

        let err = StatusPoller::new(&profile)
            .poll_once(&mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, IoError::ReadRejected { .. }));
    }

    #[tokio::test]
    async fn test_empty_battery_skips_state_read() {
        let (profile, sim, mut session) = setup();
        sim.set_value(profile.battery, Vec::new());

        assert!(StatusPoller::new(&profile).poll_once(&mut session).await.is_err());
        assert_eq!(
            sim.events(),
            vec![LinkEvent::Connected, LinkEvent::Read(profile.battery)]
        );
    }

    #[tokio::test]
    async fn test_unreachable_maps_to_not_connected() {
        let (profile, sim, mut session) = setup();
        sim.set_unreachable(true);

        let err = StatusPoller::new(&profile)
            .poll_once(&mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, IoError::NotConnected(_)));
    }
}
