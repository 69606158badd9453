// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "solem.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Where `solem.toml` is looked for, in order: current directory, the user
/// config directory, then `/etc/solem`.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("solem").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/solem").join(CONFIG_FILE_NAME));
    paths
}

/// `Ok(None)` when the file has no `[key]` table.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
    parse_section(path, &content, key)
}

fn parse_section<T: DeserializeOwned>(
    path: &Path,
    content: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let parse_err = |e: &dyn std::fmt::Display| ConfigError::ParseError(path.to_path_buf(), e.to_string());

    let table: toml::Table = toml::from_str(content).map_err(|e| parse_err(&e))?;
    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Round-trip through text so serde defaults fill in missing keys.
    let section_toml = toml::to_string(section).map_err(|e| parse_err(&e))?;
    toml::from_str::<T>(&section_toml)
        .map(Some)
        .map_err(|e| parse_err(&e))
}

/// A configuration type stored as one table of `solem.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    fn section_key() -> &'static str;

    /// Load from an explicit path. A missing section is an error here.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// First file on the search path that carries the section, or defaults
    /// when there is none.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in config_search_paths() {
            if !path.exists() {
                continue;
            }
            match load_section_from_file::<Self>(&path, Self::section_key())? {
                Some(cfg) => return Ok((cfg, Some(path))),
                None => debug!(
                    "{} has no [{}] section, skipping",
                    path.display(),
                    Self::section_key()
                ),
            }
        }
        Ok((Self::default(), None))
    }
}
