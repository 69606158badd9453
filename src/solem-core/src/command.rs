// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Controller commands and their wire encoding.
//!
//! Every command is a 7-byte frame `[opcode_hi, opcode_lo, a0, a1, a2, 0, 0]`
//! written to the command characteristic, optionally followed by the
//! 2-byte commit frame `3B 00`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ble::ids::CharacteristicId;
use crate::ble::session::TransportSession;
use crate::error::IoError;

pub const PAYLOAD_LEN: usize = 7;
pub const COMMIT_FRAME: [u8; 2] = [0x3b, 0x00];

const OP_TURN_OFF_PERMANENT: u16 = 0x3105;
const OP_TURN_OFF_DAYS: u16 = 0x3104;
const OP_TURN_ON: u16 = 0x3106;
const OP_SPRINKLE_STATION: u16 = 0x3401;
const OP_SPRINKLE_ALL: u16 = 0x3400;
const OP_RUN_PROGRAM_BASE: u16 = 0x3200;
const OP_STOP_MANUAL: u16 = 0x3009;

/// Controller mode argument used by the on/off family.
const MODE_CONTROLLER: u8 = 0xc0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    TurnOffPermanent,
    TurnOffForDays,
    TurnOn,
    SprinkleStation,
    SprinkleAll,
    RunProgram,
    StopManual,
}

impl IntentKind {
    pub const ALL: [IntentKind; 7] = [
        IntentKind::TurnOffPermanent,
        IntentKind::TurnOffForDays,
        IntentKind::TurnOn,
        IntentKind::SprinkleStation,
        IntentKind::SprinkleAll,
        IntentKind::RunProgram,
        IntentKind::StopManual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::TurnOffPermanent => "turn_off_permanent",
            IntentKind::TurnOffForDays => "turn_off_for_days",
            IntentKind::TurnOn => "turn_on",
            IntentKind::SprinkleStation => "sprinkle_station",
            IntentKind::SprinkleAll => "sprinkle_all",
            IntentKind::RunProgram => "run_program",
            IntentKind::StopManual => "stop_manual",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IntentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown intent '{}'", s))
    }
}

/// A high-level controller intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolemCommand {
    TurnOffPermanent,
    TurnOffForDays { days: u8 },
    TurnOn,
    SprinkleStation { station: u8, minutes: u8 },
    SprinkleAll { minutes: u8 },
    RunProgram { program: u8 },
    StopManual,
}

impl SolemCommand {
    pub fn kind(&self) -> IntentKind {
        match self {
            SolemCommand::TurnOffPermanent => IntentKind::TurnOffPermanent,
            SolemCommand::TurnOffForDays { .. } => IntentKind::TurnOffForDays,
            SolemCommand::TurnOn => IntentKind::TurnOn,
            SolemCommand::SprinkleStation { .. } => IntentKind::SprinkleStation,
            SolemCommand::SprinkleAll { .. } => IntentKind::SprinkleAll,
            SolemCommand::RunProgram { .. } => IntentKind::RunProgram,
            SolemCommand::StopManual => IntentKind::StopManual,
        }
    }

    pub fn payload(&self) -> CommandPayload {
        match *self {
            SolemCommand::TurnOffPermanent => {
                CommandPayload::new(OP_TURN_OFF_PERMANENT, MODE_CONTROLLER, 0x00, 0x00)
            }
            SolemCommand::TurnOffForDays { days } => {
                CommandPayload::new(OP_TURN_OFF_DAYS, MODE_CONTROLLER, days, 0x00)
            }
            SolemCommand::TurnOn => CommandPayload::new(OP_TURN_ON, MODE_CONTROLLER, 0x01, 0x00),
            SolemCommand::SprinkleStation { station, minutes } => {
                CommandPayload::new(OP_SPRINKLE_STATION, station, minutes, 0x00)
            }
            SolemCommand::SprinkleAll { minutes } => {
                CommandPayload::new(OP_SPRINKLE_ALL, 0x00, minutes, 0x00)
            }
            SolemCommand::RunProgram { program } => {
                CommandPayload::new(OP_RUN_PROGRAM_BASE + u16::from(program), 0x00, 0x00, 0x00)
            }
            SolemCommand::StopManual => CommandPayload::new(OP_STOP_MANUAL, 0x00, 0x00, 0x00),
        }
    }
}

impl fmt::Display for SolemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolemCommand::TurnOffForDays { days } => write!(f, "turn_off_for_days({})", days),
            SolemCommand::SprinkleStation { station, minutes } => {
                write!(f, "sprinkle_station({}, {} min)", station, minutes)
            }
            SolemCommand::SprinkleAll { minutes } => write!(f, "sprinkle_all({} min)", minutes),
            SolemCommand::RunProgram { program } => write!(f, "run_program({})", program),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPayload {
    pub opcode: u16,
    pub arg0: u8,
    pub arg1: u8,
    pub arg2: u8,
    pub reserved: u16,
}

impl CommandPayload {
    pub const fn new(opcode: u16, arg0: u8, arg1: u8, arg2: u8) -> Self {
        Self {
            opcode,
            arg0,
            arg1,
            arg2,
            reserved: 0,
        }
    }

    /// Big-endian wire form.
    pub fn to_bytes(&self) -> [u8; PAYLOAD_LEN] {
        let [op_hi, op_lo] = self.opcode.to_be_bytes();
        let [r_hi, r_lo] = self.reserved.to_be_bytes();
        [op_hi, op_lo, self.arg0, self.arg1, self.arg2, r_hi, r_lo]
    }
}

/// Whether a command is followed by the commit frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPolicy {
    pub default: bool,
    pub overrides: HashMap<IntentKind, bool>,
}

impl CommitPolicy {
    pub fn always() -> Self {
        Self {
            default: true,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: IntentKind, commit: bool) -> Self {
        self.overrides.insert(kind, commit);
        self
    }

    pub fn requires_commit(&self, kind: IntentKind) -> bool {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self::always()
    }
}

/// A command ready for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedCommand {
    pub payload: CommandPayload,
    pub commit: bool,
}

impl EncodedCommand {
    /// Frames in transmission order.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        let mut frames = vec![self.payload.to_bytes().to_vec()];
        if self.commit {
            frames.push(COMMIT_FRAME.to_vec());
        }
        frames
    }
}

#[derive(Debug, Clone)]
pub struct CommandEncoder {
    characteristic: CharacteristicId,
    commit: CommitPolicy,
}

impl CommandEncoder {
    pub fn new(characteristic: CharacteristicId, commit: CommitPolicy) -> Self {
        Self {
            characteristic,
            commit,
        }
    }

    pub fn characteristic(&self) -> CharacteristicId {
        self.characteristic
    }

    pub fn encode(&self, command: &SolemCommand) -> EncodedCommand {
        EncodedCommand {
            payload: command.payload(),
            commit: self.commit.requires_commit(command.kind()),
        }
    }

    /// Write every frame of `encoded`, in order, as one attempt.
    pub async fn dispatch(
        &self,
        session: &mut TransportSession,
        encoded: &EncodedCommand,
    ) -> Result<(), IoError> {
        for frame in encoded.frames() {
            session.write(self.characteristic, &frame).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::ids::COMMAND_CHARACTERISTIC;

    fn bytes(command: SolemCommand) -> [u8; PAYLOAD_LEN] {
        command.payload().to_bytes()
    }

    #[test]
    fn test_on_off_family_encoding() {
        assert_eq!(
            bytes(SolemCommand::TurnOffPermanent),
            [0x31, 0x05, 0xc0, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(SolemCommand::TurnOffForDays { days: 2 }),
            [0x31, 0x04, 0xc0, 0x02, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(SolemCommand::TurnOn),
            [0x31, 0x06, 0xc0, 0x01, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_watering_family_encoding() {
        assert_eq!(
            bytes(SolemCommand::SprinkleStation {
                station: 3,
                minutes: 15
            }),
            [0x34, 0x01, 0x03, 0x0f, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(SolemCommand::SprinkleAll { minutes: 10 }),
            [0x34, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(SolemCommand::StopManual),
            [0x30, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_run_program_folds_program_into_opcode() {
        assert_eq!(
            bytes(SolemCommand::RunProgram { program: 1 }),
            [0x32, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            bytes(SolemCommand::RunProgram { program: 255 }),
            [0x32, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_commit_follows_payload() {
        let encoder = CommandEncoder::new(COMMAND_CHARACTERISTIC, CommitPolicy::default());
        let encoded = encoder.encode(&SolemCommand::TurnOffForDays { days: 2 });

        assert_eq!(
            encoded.frames(),
            vec![
                vec![0x31, 0x04, 0xc0, 0x02, 0x00, 0x00, 0x00],
                vec![0x3b, 0x00],
            ]
        );
    }

    #[test]
    fn test_commit_override_per_intent() {
        let policy = CommitPolicy::default().with_override(IntentKind::StopManual, false);
        let encoder = CommandEncoder::new(COMMAND_CHARACTERISTIC, policy);

        assert_eq!(encoder.encode(&SolemCommand::StopManual).frames().len(), 1);
        assert_eq!(encoder.encode(&SolemCommand::TurnOn).frames().len(), 2);
    }

    #[test]
    fn test_intent_names_round_trip() {
        for kind in IntentKind::ALL {
            assert_eq!(kind.as_str().parse::<IntentKind>(), Ok(kind));
        }
        assert!("water_everything".parse::<IntentKind>().is_err());
    }
}
