mod file_config;

pub use file_config::{DeviceConfig, FileConfig, WorkConfig};

use crate::work::{BackoffCriteria, BackoffPolicy, DeviceState, NetworkState, WorkSettings};
use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub playlist_url: String,
    pub request_timeout_sec: u64,
    pub metrics_port: u16,
    pub sdk_level: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub playlist_url: String,
    pub request_timeout_sec: u64,
    pub metrics_port: u16,
    pub sdk_level: u32,

    // Feature configs (with defaults)
    pub work: WorkSettings,
    pub backoff: BackoffCriteria,
    pub device: DeviceState,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified on the command line or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let playlist_url = file.playlist_url.unwrap_or_else(|| cli.playlist_url.clone());
        if playlist_url.trim().is_empty() {
            bail!("playlist_url must not be empty");
        }
        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);
        let sdk_level = file.sdk_level.unwrap_or(cli.sdk_level);

        // Work settings - merge file config with defaults
        let work_file = file.work.unwrap_or_default();
        for (key, value) in [
            ("execution_timeout_secs", work_file.execution_timeout_secs),
            ("max_idle_secs", work_file.max_idle_secs),
            ("constraint_recheck_secs", work_file.constraint_recheck_secs),
        ] {
            if value == Some(0) {
                bail!("{} must be greater than 0", key);
            }
        }
        let defaults = WorkSettings::default();
        let work = WorkSettings {
            execution_timeout: work_file
                .execution_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.execution_timeout),
            max_idle: work_file
                .max_idle_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_idle),
            constraint_recheck: work_file
                .constraint_recheck_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.constraint_recheck),
            shutdown_grace: defaults.shutdown_grace,
        };

        let backoff_policy = match work_file.backoff_policy {
            Some(s) => match BackoffPolicy::parse(&s.to_lowercase()) {
                Some(policy) => policy,
                None => bail!("Unknown backoff_policy: {} (expected exponential or linear)", s),
            },
            None => BackoffPolicy::default(),
        };
        let backoff = match work_file.initial_backoff_secs {
            Some(secs) => BackoffCriteria::new(backoff_policy, Duration::from_secs(secs)),
            None => BackoffCriteria {
                policy: backoff_policy,
                ..BackoffCriteria::default()
            },
        };

        let device = resolve_device_state(file.device.unwrap_or_default())?;

        Ok(Self {
            db_dir,
            playlist_url,
            request_timeout_sec,
            metrics_port,
            sdk_level,
            work,
            backoff,
            device,
        })
    }

    pub fn work_db_path(&self) -> PathBuf {
        self.db_dir.join("work.db")
    }

    pub fn videos_db_path(&self) -> PathBuf {
        self.db_dir.join("videos.db")
    }
}

/// Build the static device state. Without a `[device]` section the device is
/// on an unmetered network, charging, idle, with healthy battery and storage.
fn resolve_device_state(device: DeviceConfig) -> Result<DeviceState> {
    let (connected, metered) = match device.network.as_deref().map(str::to_lowercase) {
        None => (true, false),
        Some(network) => match network.as_str() {
            "none" => (false, false),
            "metered" => (true, true),
            "unmetered" => (true, false),
            other => bail!(
                "Unknown device network: {} (expected none, metered or unmetered)",
                other
            ),
        },
    };

    Ok(DeviceState {
        network: NetworkState {
            connected,
            metered,
            roaming: device.roaming.unwrap_or(false),
        },
        battery_low: device.battery_low.unwrap_or(false),
        charging: device.charging.unwrap_or(true),
        idle: device.idle.unwrap_or(true),
        storage_low: device.storage_low.unwrap_or(false),
    })
}
