//! Configuration for Ticketwatch.
//!
//! ## config.kdl - User preferences
//!
//! Located at (first match wins):
//! - `--config-dir <DIR>/config.kdl`
//! - `$TW_CONFIG_DIR/config.kdl`
//! - `~/.config/ticketwatch/config.kdl`
//!
//! Contains the backend endpoints, stream framing, badge expiry, notification
//! permission, reconnect policy and output format. See [`schema`] for the keys.
//!
//! ## Precedence
//!
//! CLI flag > environment > config.kdl > defaults.
//!
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

use std::path::{Path, PathBuf};

use kdl::KdlDocument;

use crate::{Error, Result};

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve_config,
    resolve_config_with_env,
};
pub use schema::{CONFIG_KEYS, OutputFormat, TicketwatchConfig};

/// Environment variable that overrides the config directory.
pub const CONFIG_DIR_ENV: &str = "TW_CONFIG_DIR";

/// File name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.kdl";

/// Resolve the config directory.
///
/// `explicit` (the `--config-dir` flag) wins over `TW_CONFIG_DIR`, which wins
/// over the platform config directory.
pub fn config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::config_dir()
        .map(|dir| dir.join("ticketwatch"))
        .ok_or_else(|| Error::Config("could not determine a config directory".to_string()))
}

/// Path of config.kdl inside `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE_NAME)
}

/// Load config.kdl. A missing file is an empty config.
pub fn load_config(path: &Path) -> Result<TicketwatchConfig> {
    if !path.exists() {
        return Ok(TicketwatchConfig::new());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;

    let doc: KdlDocument = content
        .parse()
        .map_err(|e| Error::Config(format!("Failed to parse KDL in {}: {}", path.display(), e)))?;

    let config = TicketwatchConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Write config.kdl, creating the directory if needed.
pub fn save_config(path: &Path, config: &TicketwatchConfig) -> Result<()> {
    config.validate().map_err(Error::Config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut doc = config.to_kdl();
    doc.autoformat();
    std::fs::write(path, doc.to_string())?;
    tracing::debug!(path = %path.display(), "config written");
    Ok(())
}
