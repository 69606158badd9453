// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Service-call handling shared by `solem call` and `solem watch`.

use serde::Serialize;
use tracing::{info, warn};

use solem_core::{CancelToken, IntentKind, ServiceCall, SolemClient, SolemCommand};

/// Outcome of one service call, printed as a JSON line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallReport {
    pub service: Option<String>,
    pub intent: Option<IntentKind>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallReport {
    fn failed(service: Option<&str>, error: String) -> Self {
        Self {
            service: service.map(str::to_string),
            intent: None,
            ok: false,
            error: Some(error),
        }
    }
}

/// Parse and validate a JSON service call addressed to `client`'s device.
pub fn parse_call(client: &SolemClient, raw: &str) -> Result<(ServiceCall, SolemCommand), CallReport> {
    let call = ServiceCall::from_json(raw).map_err(|e| CallReport::failed(None, e.to_string()))?;
    let service = Some(call.service_name());

    let device = call
        .device()
        .map_err(|e| CallReport::failed(service, e.to_string()))?;
    if &device != client.address() {
        return Err(CallReport::failed(
            service,
            format!("no controller configured for {}", device),
        ));
    }
    let command = call
        .to_command()
        .map_err(|e| CallReport::failed(service, e.to_string()))?;
    Ok((call, command))
}

/// Run one JSON service call end to end.
pub async fn execute_call(client: &SolemClient, raw: &str, cancel: &CancelToken) -> CallReport {
    let (call, command) = match parse_call(client, raw) {
        Ok(parsed) => parsed,
        Err(report) => {
            warn!("Rejected service call: {}", report.error.as_deref().unwrap_or(""));
            return report;
        }
    };
    info!("Service call {} -> {}", call.service_name(), command);

    let result = client.send_with_cancel(command, cancel).await;
    CallReport {
        service: Some(call.service_name().to_string()),
        intent: Some(command.kind()),
        ok: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
    }
}
