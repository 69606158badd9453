// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::time::Duration;

use thiserror::Error;

use crate::ble::ids::CharacteristicId;
use crate::controller::retry::Retryable;

/// Failure to establish a link with the peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("peripheral unreachable: {0}")]
    Unreachable(String),
}

/// Failure of a single read or write on the link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("not connected: {0}")]
    NotConnected(#[from] ConnectError),
    #[error("write to {characteristic} rejected: {reason}")]
    WriteRejected {
        characteristic: CharacteristicId,
        reason: String,
    },
    #[error("read from {characteristic} rejected: {reason}")]
    ReadRejected {
        characteristic: CharacteristicId,
        reason: String,
    },
    #[error("link lost: {0}")]
    LinkLost(String),
}

/// Outcome of an operation driven through a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    #[error("operation cancelled")]
    Cancelled,
    #[error("failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Cancelled => None,
            Self::Exhausted { attempts, .. } => Some(*attempts),
        }
    }

    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Cancelled => None,
            Self::Exhausted { source, .. } => Some(source),
        }
    }
}

/// Error returned by controller commands.
pub type CommandError = RetryError<IoError>;

/// Failure of a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("device unavailable: {0}")]
    Unavailable(#[source] IoError),
    #[error("poll cancelled")]
    Cancelled,
}

impl From<RetryError<IoError>> for PollError {
    fn from(err: RetryError<IoError>) -> Self {
        match err {
            RetryError::Cancelled => Self::Cancelled,
            RetryError::Exhausted { source, .. } => Self::Unavailable(source),
        }
    }
}

// Link-level failures are all worth another attempt.
impl Retryable for ConnectError {}

impl Retryable for IoError {}
