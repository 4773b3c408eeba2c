//! `tw config` - inspect and edit config.kdl.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::Output;
use crate::config::{self as cfg, CONFIG_KEYS, ResolvedConfig};
use crate::{Error, Result};

/// One resolved key.
#[derive(Debug, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

/// Result of `tw config show`.
#[derive(Debug, Serialize)]
pub struct ConfigShowResult {
    pub path: PathBuf,
    pub exists: bool,
    pub entries: Vec<ConfigEntry>,
}

impl Output for ConfigShowResult {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Config file: {}{}",
            self.path.display(),
            if self.exists { "" } else { " (not created yet)" }
        )];
        lines.push(String::new());
        let width = self.entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
        for entry in &self.entries {
            lines.push(format!(
                "  {:<width$}  {}  [{}]",
                entry.key,
                entry.value,
                entry.source,
                width = width
            ));
        }
        lines.join("\n")
    }
}

/// Show every resolved value with its source.
pub fn config_show(path: &Path, resolved: &ResolvedConfig) -> ConfigShowResult {
    ConfigShowResult {
        path: path.to_path_buf(),
        exists: path.exists(),
        entries: resolved
            .entries()
            .into_iter()
            .map(|(key, value, source)| ConfigEntry {
                key: key.to_string(),
                value,
                source: source.to_string(),
            })
            .collect(),
    }
}

/// Result of `tw config set`.
#[derive(Debug, Serialize)]
pub struct ConfigSetResult {
    pub key: String,
    pub value: String,
    pub path: PathBuf,
}

impl Output for ConfigSetResult {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        format!("Set {} = {} in {}", self.key, self.value, self.path.display())
    }
}

/// Validate and persist one key.
pub fn config_set(path: &Path, key: &str, value: &str) -> Result<ConfigSetResult> {
    if !CONFIG_KEYS.contains(&key) {
        return Err(Error::Config(format!(
            "unknown key '{}' (valid keys: {})",
            key,
            CONFIG_KEYS.join(", ")
        )));
    }

    let mut config = cfg::load_config(path)?;
    config.set(key, value).map_err(Error::Config)?;
    cfg::save_config(path, &config)?;

    Ok(ConfigSetResult {
        key: key.to_string(),
        value: value.to_string(),
        path: path.to_path_buf(),
    })
}

/// Result of `tw config path`.
#[derive(Debug, Serialize)]
pub struct ConfigPathResult {
    pub path: PathBuf,
    pub exists: bool,
}

impl Output for ConfigPathResult {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        self.path.display().to_string()
    }
}

pub fn config_path(path: &Path) -> ConfigPathResult {
    ConfigPathResult {
        path: path.to_path_buf(),
        exists: path.exists(),
    }
}
