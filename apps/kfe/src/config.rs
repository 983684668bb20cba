//! Front-end configuration.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/kfe/kfe.toml`
//! - Windows: `%APPDATA%/kfe/kfe.toml`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kfe_catalog::{CategoryOrder, DEVICE_EF0, DEVICE_MS0};
use kfe_transfer::{MAX_BUFFER_SIZE, MIN_BUFFER_SIZE};
use serde::{Deserialize, Serialize};

/// Category order used while numbering is off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSetting {
    #[default]
    Alphabetical,
    Recent,
}

impl From<OrderSetting> for CategoryOrder {
    fn from(order: OrderSetting) -> Self {
        match order {
            OrderSetting::Alphabetical => CategoryOrder::Alphabetical,
            OrderSetting::Recent => CategoryOrder::MostRecent,
        }
    }
}

/// Front-end configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device root (`"ms0:/"`) to host directory.
    #[serde(default = "default_devices")]
    pub devices: BTreeMap<String, PathBuf>,

    /// Device holding the plugin settings file.
    #[serde(default = "default_settings_device")]
    pub settings_device: String,

    #[serde(default)]
    pub category_order: OrderSetting,

    /// Copy buffer size in KiB (64..=512).
    #[serde(default = "default_copy_buffer_kib")]
    pub copy_buffer_kib: u32,

    /// Seconds between two free-space probes.
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_devices() -> BTreeMap<String, PathBuf> {
    let base = home_dir().join("kfe");
    BTreeMap::from([
        (DEVICE_MS0.to_string(), base.join("ms0")),
        (DEVICE_EF0.to_string(), base.join("ef0")),
    ])
}

fn default_settings_device() -> String {
    DEVICE_MS0.into()
}

fn default_copy_buffer_kib() -> u32 {
    256
}

fn default_probe_interval() -> u64 {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            settings_device: default_settings_device(),
            category_order: OrderSetting::default(),
            copy_buffer_kib: default_copy_buffer_kib(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or creates a default there if not found.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Loads configuration from the platform default path.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Copy buffer in bytes, clamped to the supported range.
    pub fn buffer_size(&self) -> usize {
        (self.copy_buffer_kib as usize * 1024).clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE)
    }
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| "C:\\Users\\Default".into()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".into()))
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("kfe").join("kfe.toml")
    }

    #[cfg(not(target_os = "windows"))]
    {
        home_dir().join(".config").join("kfe").join("kfe.toml")
    }
}
