//! Application paths and persisted settings.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::NetworkType;
use crate::core::ReconnectPolicy;

pub const SETTINGS_FILE: &str = "streetplan.json";
pub const LOG_FILE: &str = "streetplan.log";
const APP_DIR: &str = "streetplan";
const CONFIG_DIR_ENV: &str = "STREETPLAN_CONFIG_DIR";

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Create PathConfig from CLI arguments and environment variables
    ///
    /// Priority: CLI args → ENV var (STREETPLAN_CONFIG_DIR) → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. STREETPLAN_CONFIG_DIR environment variable
/// 3. Local folder IF streetplan.json or streetplan.log exist there
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/streetplan/{name}
/// - macOS: ~/Library/Application Support/streetplan/{name}
/// - Windows: %APPDATA%\streetplan\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir).join(name)
}

/// Get path to a data file (logs, downloads)
///
/// Same priority as [`config_file`], falling back to the platform data dir:
/// - Linux: ~/.local/share/streetplan/{name}
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir).join(name)
}

/// Create the config and data directories if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = resolve_dir(config, dirs_next::config_dir);
    let data_dir = resolve_dir(config, dirs_next::data_dir);

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    if data_dir != config_dir {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform_dir: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = platform_dir() {
        return dir.join(APP_DIR);
    }

    PathBuf::from(".")
}

/// User settings persisted as `streetplan.json`. Unknown or missing keys use
/// defaults so older files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Planning API root including the `/api` prefix.
    pub api_base_url: String,
    /// Progress WebSocket. Empty disables live progress.
    pub progress_url: String,
    pub network_type: NetworkType,
    pub default_speed: f64,
    /// Reconnect attempts after the progress socket drops (0 = never).
    pub reconnect_attempts: u32,
    pub request_timeout_secs: u64,
    /// Export target; relative paths resolve against the data dir.
    pub download_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            progress_url: "ws://localhost:8000/ws".to_string(),
            network_type: NetworkType::Drive,
            default_speed: 1.0,
            reconnect_attempts: ReconnectPolicy::default().attempts,
            request_timeout_secs: 300,
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl Settings {
    /// Load from `path`. Missing file gives defaults; a malformed one is
    /// logged and replaced by defaults.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(Some(settings)) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                debug!("No settings at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                warn!("Ignoring settings file: {:#}", e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let settings = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(settings))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            attempts: self.reconnect_attempts,
            ..ReconnectPolicy::default()
        }
    }

    /// Absolute download directory.
    pub fn download_path(&self, paths: &PathConfig) -> PathBuf {
        if self.download_dir.is_absolute() {
            self.download_dir.clone()
        } else {
            resolve_dir(paths, dirs_next::data_dir).join(&self.download_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file(LOG_FILE, &config), PathBuf::from("/custom/streetplan.log"));
    }

    #[test]
    fn test_cli_dir_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_settings_roundtrip_and_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);

        assert_eq!(Settings::load(&path), Settings::default());

        let settings = Settings {
            network_type: NetworkType::Bike,
            reconnect_attempts: 0,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path), settings);

        std::fs::write(&path, r#"{"api_base_url": "http://planner:9000/api"}"#).unwrap();
        let partial = Settings::load(&path);
        assert_eq!(partial.api_base_url, "http://planner:9000/api");
        assert_eq!(partial.network_type, NetworkType::Drive);
        assert_eq!(partial.reconnect_policy().attempts, 5);
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(Settings::load(&path), Settings::default());
    }

    #[test]
    fn test_download_path_relative_to_data_dir() {
        let paths = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        let settings = Settings::default();
        assert_eq!(settings.download_path(&paths), PathBuf::from("/custom/downloads"));

        let absolute = Settings {
            download_dir: PathBuf::from("/srv/exports"),
            ..Default::default()
        };
        assert_eq!(absolute.download_path(&paths), PathBuf::from("/srv/exports"));
    }
}
