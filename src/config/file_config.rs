use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub playlist_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub metrics_port: Option<u16>,
    pub sdk_level: Option<u32>,

    // Feature configs
    pub work: Option<WorkConfig>,
    pub device: Option<DeviceConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkConfig {
    /// "exponential" or "linear"
    pub backoff_policy: Option<String>,
    pub initial_backoff_secs: Option<u64>,
    pub max_idle_secs: Option<u64>,
    pub constraint_recheck_secs: Option<u64>,
    pub execution_timeout_secs: Option<u64>,
}

/// Static device conditions the daemon admits work against.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    /// "none", "metered" or "unmetered"
    pub network: Option<String>,
    pub roaming: Option<bool>,
    pub battery_low: Option<bool>,
    pub charging: Option<bool>,
    pub idle: Option<bool>,
    pub storage_low: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
