// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for the `solem` CLI.
//!
//! Config is loaded from the `[solem]` section of `solem.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./solem.toml`
//! 3. `~/.config/solem/solem.toml`
//! 4. `/etc/solem/solem.toml`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use solem_app::{parse_level, ConfigError, ConfigFile};
use solem_core::controller::{AdaptivePolling, ExponentialBackoff, NoRetry, RetryPolicy};
use solem_core::{CharacteristicId, ClientSettings, CommitPolicy, GattProfile, IntentKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SolemConfig {
    pub general: GeneralConfig,
    pub device: DeviceConfig,
    pub behavior: BehaviorConfig,
    pub commit: CommitConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Which controller to talk to, and through what.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Peripheral address (MAC on Linux, platform UUID on macOS)
    pub address: Option<String>,
    /// BLE backend name ("btleplug" or "dummy")
    pub backend: String,
    pub command_characteristic: CharacteristicId,
    pub battery_characteristic: CharacteristicId,
    pub state_characteristic: CharacteristicId,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let profile = GattProfile::default();
        Self {
            address: None,
            backend: "btleplug".to_string(),
            command_characteristic: profile.command,
            battery_characteristic: profile.battery,
            state_characteristic: profile.state,
        }
    }
}

impl DeviceConfig {
    pub fn profile(&self) -> GattProfile {
        GattProfile {
            command: self.command_characteristic,
            battery: self.battery_characteristic,
            state: self.state_characteristic,
        }
    }
}

/// Timeouts, retry and polling behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Connect timeout for commands, in milliseconds
    pub connect_timeout_ms: u64,
    /// Connect timeout for status polls, in milliseconds
    pub poll_connect_timeout_ms: u64,
    /// Attempts per command before giving up
    pub max_retries: u32,
    /// First back-off delay in milliseconds; doubles on every retry
    pub retry_initial_delay_ms: u64,
    /// Upper bound for a single back-off delay in milliseconds
    pub retry_max_delay_ms: u64,
    /// Attempts per status poll (1 = no retry)
    pub poll_max_attempts: u32,
    /// Poll interval while idle, in seconds (watch mode)
    pub poll_interval_secs: u64,
    /// Poll interval while a valve is open, in seconds (watch mode)
    pub poll_interval_watering_secs: u64,
    /// Keep the link open between operations
    pub keep_connected: bool,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            poll_connect_timeout_ms: 10_000,
            max_retries: 3,
            retry_initial_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            poll_max_attempts: 1,
            poll_interval_secs: 300,
            poll_interval_watering_secs: 60,
            keep_connected: true,
        }
    }
}

impl BehaviorConfig {
    pub fn polling(&self) -> AdaptivePolling {
        AdaptivePolling::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_interval_watering_secs),
        )
    }

    fn backoff(&self, max_attempts: u32) -> ExponentialBackoff {
        ExponentialBackoff::new(
            max_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }
}

/// Commit frame (`3B 00`) after each command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub default: bool,
    /// Per-intent overrides keyed by intent name (e.g. `stop_manual`)
    pub overrides: BTreeMap<String, bool>,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            default: true,
            overrides: BTreeMap::new(),
        }
    }
}

impl CommitConfig {
    pub fn policy(&self) -> Result<CommitPolicy, String> {
        let mut policy = CommitPolicy {
            default: self.default,
            ..CommitPolicy::default()
        };
        for (name, commit) in &self.overrides {
            let kind: IntentKind = name
                .parse()
                .map_err(|e| format!("[commit].overrides: {}", e))?;
            policy = policy.with_override(kind, *commit);
        }
        Ok(policy)
    }
}

impl SolemConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if let Some(address) = &self.device.address {
            if address.trim().is_empty() {
                return Err("[device].address must not be empty".to_string());
            }
        }
        if self.device.backend.trim().is_empty() {
            return Err("[device].backend must not be empty".to_string());
        }

        let b = &self.behavior;
        if b.connect_timeout_ms == 0 {
            return Err("[behavior].connect_timeout_ms must be > 0".to_string());
        }
        if b.poll_connect_timeout_ms == 0 {
            return Err("[behavior].poll_connect_timeout_ms must be > 0".to_string());
        }
        if b.max_retries == 0 {
            return Err("[behavior].max_retries must be > 0".to_string());
        }
        if b.poll_max_attempts == 0 {
            return Err("[behavior].poll_max_attempts must be > 0".to_string());
        }
        if b.retry_initial_delay_ms == 0 {
            return Err("[behavior].retry_initial_delay_ms must be > 0".to_string());
        }
        if b.retry_max_delay_ms < b.retry_initial_delay_ms {
            return Err(
                "[behavior].retry_max_delay_ms must be >= retry_initial_delay_ms".to_string(),
            );
        }
        if b.poll_interval_secs == 0 {
            return Err("[behavior].poll_interval_secs must be > 0".to_string());
        }
        if b.poll_interval_watering_secs == 0 {
            return Err("[behavior].poll_interval_watering_secs must be > 0".to_string());
        }

        self.commit.policy()?;
        Ok(())
    }

    /// Client settings for the configured device.
    pub fn client_settings(&self) -> Result<ClientSettings, String> {
        let b = &self.behavior;
        let poll_retry: Arc<dyn RetryPolicy> = if b.poll_max_attempts > 1 {
            Arc::new(b.backoff(b.poll_max_attempts))
        } else {
            Arc::new(NoRetry)
        };
        Ok(ClientSettings {
            profile: self.device.profile(),
            connect_timeout: Duration::from_millis(b.connect_timeout_ms),
            poll_connect_timeout: Duration::from_millis(b.poll_connect_timeout_ms),
            command_retry: Arc::new(b.backoff(b.max_retries)),
            poll_retry,
            commit: self.commit.policy()?,
            keep_connected: b.keep_connected,
        })
    }

    /// Example configuration under the `[solem]` header.
    pub fn example_toml() -> String {
        #[derive(Serialize)]
        struct Wrapper {
            solem: SolemConfig,
        }
        let mut overrides = BTreeMap::new();
        overrides.insert(IntentKind::StopManual.as_str().to_string(), false);
        let example = SolemConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            device: DeviceConfig {
                address: Some("C8:47:8C:12:34:56".to_string()),
                ..DeviceConfig::default()
            },
            behavior: BehaviorConfig::default(),
            commit: CommitConfig {
                default: true,
                overrides,
            },
        };
        toml::to_string_pretty(&Wrapper { solem: example }).unwrap_or_default()
    }
}

impl ConfigFile for SolemConfig {
    fn section_key() -> &'static str {
        "solem"
    }
}

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    match level {
        Some(level) if parse_level(level).is_none() => Err(format!(
            "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
            level
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolemConfig::default();
        assert_eq!(config.device.backend, "btleplug");
        assert_eq!(config.device.profile(), GattProfile::default());
        assert_eq!(config.behavior.connect_timeout_ms, 20_000);
        assert_eq!(config.behavior.poll_connect_timeout_ms, 10_000);
        assert_eq!(config.behavior.max_retries, 3);
        assert_eq!(config.behavior.retry_initial_delay_ms, 1_000);
        assert_eq!(config.behavior.poll_max_attempts, 1);
        assert_eq!(config.behavior.poll_interval_secs, 300);
        assert!(config.behavior.keep_connected);
        assert!(config.commit.default);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[device]
address = "c8:47:8c:12:34:56"
backend = "dummy"
command_characteristic = "a003"
battery_characteristic = "2a19"
state_characteristic = "0xa003"

[behavior]
connect_timeout_ms = 5000
max_retries = 5
retry_initial_delay_ms = 250
retry_max_delay_ms = 4000
keep_connected = false

[commit]
default = false
overrides = { turn_on = true }
"#;

        let config: SolemConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.device.backend, "dummy");
        assert_eq!(
            config.device.command_characteristic,
            CharacteristicId::parse("a003").unwrap()
        );
        assert_eq!(config.behavior.poll_connect_timeout_ms, 10_000);

        let settings = config.client_settings().unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_millis(5000));
        assert_eq!(settings.command_retry.max_attempts(), 5);
        assert_eq!(settings.command_retry.delay(0), Duration::from_millis(250));
        assert_eq!(settings.poll_retry.max_attempts(), 1);
        assert!(!settings.keep_connected);
        assert!(settings.commit.requires_commit(IntentKind::TurnOn));
        assert!(!settings.commit.requires_commit(IntentKind::StopManual));
    }

    #[test]
    fn test_invalid_characteristic_fails_to_parse() {
        let toml_str = r#"
[device]
battery_characteristic = "battery"
"#;
        assert!(toml::from_str::<SolemConfig>(toml_str).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SolemConfig::default();
        config.general.log_level = Some("loud".to_string());
        assert!(config.validate().is_err());

        let mut config = SolemConfig::default();
        config.behavior.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = SolemConfig::default();
        config.behavior.retry_max_delay_ms = 10;
        assert!(config.validate().is_err());

        let mut config = SolemConfig::default();
        config.device.address = Some("  ".to_string());
        assert!(config.validate().is_err());

        let mut config = SolemConfig::default();
        config.commit.overrides.insert("flood".to_string(), true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_retry_follows_attempts() {
        let mut config = SolemConfig::default();
        config.behavior.poll_max_attempts = 2;
        let settings = config.client_settings().unwrap();
        assert_eq!(settings.poll_retry.max_attempts(), 2);
    }

    #[test]
    fn test_example_toml_round_trips() {
        let example = SolemConfig::example_toml();
        assert!(example.contains("[solem.device]"));

        let table: toml::Table = toml::from_str(&example).unwrap();
        let section = toml::to_string(&table["solem"]).unwrap();
        let parsed: SolemConfig = toml::from_str(&section).unwrap();
        assert!(parsed.validate().is_ok());
        assert_eq!(parsed.device.address.as_deref(), Some("C8:47:8C:12:34:56"));
    }
}
