use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::AppError;

const DEFAULT_WIRELESS_PORT: u16 = 5555;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SETTLE_MS: u64 = 500;
const MAX_SETTLE_MS: u64 = 10_000;
const DEFAULT_MAX_PARALLEL_PROMOTIONS: usize = 4;

const APP_DIR_NAME: &str = "fadadb";
const CONFIG_FILE_NAME: &str = "config.json";
const STATE_FILE_NAME: &str = "known_devices.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BridgeSettings {
    pub command_path: String,
    pub timeout_secs: u64,
    pub wireless_port: u16,
    pub wifi_interface: String,
    pub tcpip_settle_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            command_path: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            wireless_port: DEFAULT_WIRELESS_PORT,
            wifi_interface: "wlan0".to_string(),
            tcpip_settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl BridgeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.tcpip_settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoverySettings {
    pub max_parallel_promotions: usize,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_parallel_promotions: DEFAULT_MAX_PARALLEL_PROMOTIONS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StateSettings {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub state: StateSettings,
}

impl AppConfig {
    /// Location of the known-devices file. `FADADB_STATE_PATH` wins over the config value.
    pub fn state_path(&self) -> PathBuf {
        if let Some(path) = env_path("FADADB_STATE_PATH") {
            return path;
        }
        if !self.state.path.trim().is_empty() {
            return PathBuf::from(self.state.path.trim());
        }
        app_dir().join(STATE_FILE_NAME)
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn config_path() -> PathBuf {
    env_path("FADADB_CONFIG_PATH").unwrap_or_else(|| app_dir().join(CONFIG_FILE_NAME))
}

pub fn load_config_from_path(path: &Path, trace_id: &str) -> Result<AppConfig, AppError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|err| AppError::system(format!("Failed to read config: {err}"), trace_id))?;
    let config: AppConfig = serde_json::from_str(&raw)
        .map_err(|err| AppError::system(format!("Failed to parse config: {err}"), trace_id))?;
    Ok(validate_config(config))
}

pub fn validate_config(mut config: AppConfig) -> AppConfig {
    if config.bridge.timeout_secs == 0 {
        config.bridge.timeout_secs = DEFAULT_TIMEOUT_SECS;
    }
    config.bridge.timeout_secs = config.bridge.timeout_secs.min(MAX_TIMEOUT_SECS);
    if config.bridge.wireless_port == 0 {
        config.bridge.wireless_port = DEFAULT_WIRELESS_PORT;
    }
    if config.bridge.wifi_interface.trim().is_empty() {
        config.bridge.wifi_interface = "wlan0".to_string();
    }
    config.bridge.tcpip_settle_ms = config.bridge.tcpip_settle_ms.min(MAX_SETTLE_MS);
    if config.discovery.max_parallel_promotions == 0 {
        config.discovery.max_parallel_promotions = DEFAULT_MAX_PARALLEL_PROMOTIONS;
    }
    config
}
