// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Named service calls, as received in JSON form.
//!
//! ```json
//! {"service": "sprinkle_station", "device_mac": "AA:BB:CC:DD:EE:FF", "station": 3, "minutes": 15}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ble::ids::{AddressError, PeripheralAddress};
use crate::command::SolemCommand;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid service call: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid device_mac: {0}")]
    Address(#[from] AddressError),
    #[error("{service}: {field} = {value} is outside 0..=255")]
    OutOfRange {
        service: &'static str,
        field: &'static str,
        value: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceCall {
    TurnOffPermanent {
        device_mac: String,
    },
    #[serde(rename = "turn_off_x_days")]
    TurnOffForDays {
        device_mac: String,
        days: i64,
    },
    TurnOn {
        device_mac: String,
    },
    SprinkleStation {
        device_mac: String,
        station: i64,
        minutes: i64,
    },
    SprinkleAll {
        device_mac: String,
        minutes: i64,
    },
    RunProgram {
        device_mac: String,
        program: i64,
    },
    StopManual {
        device_mac: String,
    },
}

impl ServiceCall {
    pub fn from_json(raw: &str) -> Result<Self, ServiceError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            ServiceCall::TurnOffPermanent { .. } => "turn_off_permanent",
            ServiceCall::TurnOffForDays { .. } => "turn_off_x_days",
            ServiceCall::TurnOn { .. } => "turn_on",
            ServiceCall::SprinkleStation { .. } => "sprinkle_station",
            ServiceCall::SprinkleAll { .. } => "sprinkle_all",
            ServiceCall::RunProgram { .. } => "run_program",
            ServiceCall::StopManual { .. } => "stop_manual",
        }
    }

    pub fn device(&self) -> Result<PeripheralAddress, ServiceError> {
        let raw = match self {
            ServiceCall::TurnOffPermanent { device_mac }
            | ServiceCall::TurnOffForDays { device_mac, .. }
            | ServiceCall::TurnOn { device_mac }
            | ServiceCall::SprinkleStation { device_mac, .. }
            | ServiceCall::SprinkleAll { device_mac, .. }
            | ServiceCall::RunProgram { device_mac, .. }
            | ServiceCall::StopManual { device_mac } => device_mac,
        };
        Ok(PeripheralAddress::parse(raw)?)
    }

    pub fn to_command(&self) -> Result<SolemCommand, ServiceError> {
        let byte = |field: &'static str, value: i64| {
            u8::try_from(value).map_err(|_| ServiceError::OutOfRange {
                service: self.service_name(),
                field,
                value,
            })
        };
        Ok(match *self {
            ServiceCall::TurnOffPermanent { .. } => SolemCommand::TurnOffPermanent,
            ServiceCall::TurnOffForDays { days, .. } => SolemCommand::TurnOffForDays {
                days: byte("days", days)?,
            },
            ServiceCall::TurnOn { .. } => SolemCommand::TurnOn,
            ServiceCall::SprinkleStation {
                station, minutes, ..
            } => SolemCommand::SprinkleStation {
                station: byte("station", station)?,
                minutes: byte("minutes", minutes)?,
            },
            ServiceCall::SprinkleAll { minutes, .. } => SolemCommand::SprinkleAll {
                minutes: byte("minutes", minutes)?,
            },
            ServiceCall::RunProgram { program, .. } => SolemCommand::RunProgram {
                program: byte("program", program)?,
            },
            ServiceCall::StopManual { .. } => SolemCommand::StopManual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sprinkle_station_call() {
        let call = ServiceCall::from_json(
            r#"{"service": "sprinkle_station", "device_mac": "aa:bb:cc:dd:ee:ff", "station": 3, "minutes": 15}"#,
        )
        .unwrap();

        assert_eq!(call.device().unwrap().as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(
            call.to_command().unwrap(),
            SolemCommand::SprinkleStation {
                station: 3,
                minutes: 15
            }
        );
    }

    #[test]
    fn test_turn_off_x_days_call() {
        let call = ServiceCall::from_json(
            r#"{"service": "turn_off_x_days", "device_mac": "AA:BB:CC:DD:EE:FF", "days": 2}"#,
        )
        .unwrap();
        assert_eq!(call.service_name(), "turn_off_x_days");
        assert_eq!(
            call.to_command().unwrap(),
            SolemCommand::TurnOffForDays { days: 2 }
        );
    }

    #[test]
    fn test_argument_out_of_range() {
        let call = ServiceCall::SprinkleAll {
            device_mac: "AA:BB:CC:DD:EE:FF".to_string(),
            minutes: 300,
        };
        let err = call.to_command().unwrap_err();
        assert!(matches!(
            err,
            ServiceError::OutOfRange {
                field: "minutes",
                value: 300,
                ..
            }
        ));

        let negative = ServiceCall::RunProgram {
            device_mac: "AA:BB:CC:DD:EE:FF".to_string(),
            program: -1,
        };
        assert!(negative.to_command().is_err());
    }

    #[test]
    fn test_unknown_service_rejected() {
        let err = ServiceCall::from_json(r#"{"service": "flood", "device_mac": "x"}"#).unwrap_err();
        assert!(matches!(err, ServiceError::Parse(_)));
    }

    #[test]
    fn test_missing_device_mac_rejected() {
        assert!(ServiceCall::from_json(r#"{"service": "turn_on"}"#).is_err());
        let blank = ServiceCall::TurnOn {
            device_mac: "  ".to_string(),
        };
        assert!(matches!(blank.device(), Err(ServiceError::Address(_))));
    }
}
