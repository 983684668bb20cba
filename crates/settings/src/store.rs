//! Settings service shared by the scanner, enforcer and explorer.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use kfe_catalog::{Blacklist, device_of, parent_of};
use kfe_storage::Storage;

use crate::file::{Settings, SettingsField};
use crate::{SettingsError, blacklist_path, settings_path};

/// Owns the settings file and the per-device blacklist cache.
pub struct SettingsStore {
    storage: Arc<dyn Storage>,
    settings_device: String,
    blacklists: HashMap<String, Blacklist>,
}

impl SettingsStore {
    /// Creates a store reading settings from `settings_device` (`"ms0:/"`).
    pub fn new(storage: Arc<dyn Storage>, settings_device: &str) -> Result<Self, SettingsError> {
        if device_of(settings_device) != Some(settings_device) {
            return Err(SettingsError::InvalidDevice(settings_device.to_string()));
        }
        Ok(Self {
            storage,
            settings_device: settings_device.to_string(),
            blacklists: HashMap::new(),
        })
    }

    pub fn settings_device(&self) -> &str {
        &self.settings_device
    }

    /// Reads the settings file.
    ///
    /// A missing, unreadable or wrongly sized file yields all-zero settings.
    pub fn load(&self) -> Settings {
        let path = settings_path(&self.settings_device);
        match self.storage.read_file(&path) {
            Ok(bytes) => Settings::decode(&bytes).unwrap_or_else(|| {
                tracing::warn!(path = %path, len = bytes.len(), "settings file has wrong size, using defaults");
                Settings::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to read settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Writes the whole record.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let path = settings_path(&self.settings_device);
        if let Some(dir) = parent_of(&path) {
            self.storage.create_dir_all(dir)?;
        }
        self.storage.write_file(&path, &settings.encode())?;
        tracing::debug!(path = %path, ?settings, "settings saved");
        Ok(())
    }

    /// Read-modify-write of a single field. Returns the saved record.
    pub fn update(&self, field: SettingsField, value: u32) -> Result<Settings, SettingsError> {
        let mut settings = self.load();
        settings.set(field, value);
        self.save(&settings)?;
        Ok(settings)
    }

    /// Blacklist of `device`, loaded on first use.
    pub fn blacklist(&mut self, device: &str) -> Blacklist {
        if let Some(cached) = self.blacklists.get(device) {
            return cached.clone();
        }
        self.reload_blacklist(device)
    }

    /// Re-reads the blacklist file of `device`; a missing file is an empty list.
    pub fn reload_blacklist(&mut self, device: &str) -> Blacklist {
        let path = blacklist_path(device);
        let blacklist = match self.storage.read_file(&path) {
            Ok(bytes) => Blacklist::parse(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %path, error = %e, "failed to read blacklist");
                }
                Blacklist::default()
            }
        };
        self.blacklists.insert(device.to_string(), blacklist.clone());
        blacklist
    }

    /// Writes the blacklist file of `device` and updates the cache.
    pub fn save_blacklist(&mut self, device: &str, blacklist: &Blacklist) -> Result<(), SettingsError> {
        let path = blacklist_path(device);
        if let Some(dir) = parent_of(&path) {
            self.storage.create_dir_all(dir)?;
        }
        self.storage
            .write_file(&path, blacklist.to_file_text().as_bytes())?;
        self.blacklists.insert(device.to_string(), blacklist.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfe_storage::HostStorage;

    fn store(tmp: &tempfile::TempDir) -> (Arc<HostStorage>, SettingsStore) {
        let host = Arc::new(HostStorage::new([("ms0:/", tmp.path())]));
        let store = SettingsStore::new(host.clone(), "ms0:/").unwrap();
        (host, store)
    }

    #[test]
    fn missing_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, store) = store(&tmp);
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn corrupt_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, store) = store(&tmp);
        host.create_dir_all("ms0:/seplugins/gclite").unwrap();
        host.write_file("ms0:/seplugins/gclite/settings.bin", &[1; 12])
            .unwrap();
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn update_touches_one_field() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, store) = store(&tmp);
        let initial = Settings {
            mode: 3,
            prefix: 0,
            uncategorized: 1,
            selection: 9,
            catsort: 0,
        };
        store.save(&initial).unwrap();

        let saved = store.update(SettingsField::Prefix, 1).unwrap();
        assert_eq!(saved, Settings { prefix: 1, ..initial });
        assert_eq!(store.load(), saved);

        let raw = host.read_file("ms0:/seplugins/gclite/settings.bin").unwrap();
        assert_eq!(raw.len(), 20);
        assert_eq!(&raw[..4], &3u32.to_le_bytes());
        assert_eq!(&raw[4..8], &1u32.to_le_bytes());
    }

    #[test]
    fn blacklist_is_cached_until_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, mut store) = store(&tmp);
        assert!(store.blacklist("ms0:/").is_empty());

        host.create_dir_all("ms0:/seplugins/gclite").unwrap();
        host.write_file("ms0:/seplugins/gclite/blacklist.txt", b"_test\r\n_old\n")
            .unwrap();
        assert!(store.blacklist("ms0:/").is_empty());

        let reloaded = store.reload_blacklist("ms0:/");
        assert_eq!(reloaded.patterns(), ["_test", "_old"]);
        assert!(store.blacklist("ms0:/").matches("01CAT_Foo_test"));
    }

    #[test]
    fn save_blacklist_writes_crlf() {
        let tmp = tempfile::tempdir().unwrap();
        let (host, mut store) = store(&tmp);
        store
            .save_blacklist("ms0:/", &Blacklist::new(["_a", "_b"]))
            .unwrap();
        let raw = host.read_file("ms0:/seplugins/gclite/blacklist.txt").unwrap();
        assert_eq!(raw, b"_a\r\n_b\r\n");
        assert_eq!(store.reload_blacklist("ms0:/").patterns(), ["_a", "_b"]);
    }

    #[test]
    fn rejects_non_device_settings_root() {
        let tmp = tempfile::tempdir().unwrap();
        let host = Arc::new(HostStorage::new([("ms0:/", tmp.path())]));
        assert!(matches!(
            SettingsStore::new(host.clone(), "ms0:/ISO"),
            Err(SettingsError::InvalidDevice(_))
        ));
        assert!(SettingsStore::new(host, "ms0:").is_err());
    }
}
