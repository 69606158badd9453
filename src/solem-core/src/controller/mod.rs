// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Operation control: retry policies, cancellation and the retry driver.

pub mod cancel;
pub mod policies;
pub mod retry;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use policies::{AdaptivePolling, ExponentialBackoff, NoRetry, PollingPolicy, RetryPolicy};
pub use retry::{retry, RetryState, Retryable};
