//! Category plugin settings.
//!
//! Two small files live under `seplugins/gclite/`: a packed binary settings
//! record on the settings device, and one suffix blacklist per device.
//! [`SettingsStore`] owns both and is handed to whoever needs them.

mod file;
mod store;

pub use file::{SETTINGS_LEN, Settings, SettingsField};
pub use store::SettingsStore;

/// Directory (relative to a device root) holding the plugin files.
pub const PLUGIN_DIR: &str = "seplugins/gclite";

/// Settings file name inside [`PLUGIN_DIR`].
pub const SETTINGS_FILE: &str = "settings.bin";

/// Blacklist file name inside [`PLUGIN_DIR`].
pub const BLACKLIST_FILE: &str = "blacklist.txt";

/// Errors produced by the settings crate.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a device root: {0}")]
    InvalidDevice(String),
}

/// Path of the settings file on `device`.
pub fn settings_path(device: &str) -> String {
    format!("{device}{PLUGIN_DIR}/{SETTINGS_FILE}")
}

/// Path of the blacklist file on `device`.
pub fn blacklist_path(device: &str) -> String {
    format!("{device}{PLUGIN_DIR}/{BLACKLIST_FILE}")
}
