//! Binary settings record: five little-endian `u32` fields.

use kfe_catalog::{CategoryOrder, NamingScheme};
use serde::{Deserialize, Serialize};

/// Exact size of the settings file in bytes.
pub const SETTINGS_LEN: usize = 20;

/// Fields of the settings record, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsField {
    Mode,
    Prefix,
    Uncategorized,
    Selection,
    CatSort,
}

impl SettingsField {
    fn offset(self) -> usize {
        match self {
            SettingsField::Mode => 0,
            SettingsField::Prefix => 4,
            SettingsField::Uncategorized => 8,
            SettingsField::Selection => 12,
            SettingsField::CatSort => 16,
        }
    }
}

/// Decoded settings record.
///
/// Values are kept as raw words so that a read-modify-write never changes a
/// field it did not touch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub mode: u32,
    pub prefix: u32,
    pub uncategorized: u32,
    pub selection: u32,
    pub catsort: u32,
}

impl Settings {
    /// Decodes a record; any length other than [`SETTINGS_LEN`] yields `None`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != SETTINGS_LEN {
            return None;
        }
        let word = |field: SettingsField| {
            let at = field.offset();
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Some(Self {
            mode: word(SettingsField::Mode),
            prefix: word(SettingsField::Prefix),
            uncategorized: word(SettingsField::Uncategorized),
            selection: word(SettingsField::Selection),
            catsort: word(SettingsField::CatSort),
        })
    }

    pub fn encode(&self) -> [u8; SETTINGS_LEN] {
        let mut out = [0u8; SETTINGS_LEN];
        for field in [
            SettingsField::Mode,
            SettingsField::Prefix,
            SettingsField::Uncategorized,
            SettingsField::Selection,
            SettingsField::CatSort,
        ] {
            let at = field.offset();
            out[at..at + 4].copy_from_slice(&self.get(field).to_le_bytes());
        }
        out
    }

    pub fn get(&self, field: SettingsField) -> u32 {
        match field {
            SettingsField::Mode => self.mode,
            SettingsField::Prefix => self.prefix,
            SettingsField::Uncategorized => self.uncategorized,
            SettingsField::Selection => self.selection,
            SettingsField::CatSort => self.catsort,
        }
    }

    pub fn set(&mut self, field: SettingsField, value: u32) {
        match field {
            SettingsField::Mode => self.mode = value,
            SettingsField::Prefix => self.prefix = value,
            SettingsField::Uncategorized => self.uncategorized = value,
            SettingsField::Selection => self.selection = value,
            SettingsField::CatSort => self.catsort = value,
        }
    }

    /// Folder decorations implied by `prefix` and `catsort`.
    pub fn naming_scheme(&self) -> NamingScheme {
        NamingScheme {
            prefix: self.prefix != 0,
            numbered: self.catsort != 0,
        }
    }

    /// Whether the uncategorized pseudo-category is shown.
    pub fn show_uncategorized(&self) -> bool {
        self.uncategorized != 0
    }

    /// Category ordering: numbered when `catsort` is on, `fallback` otherwise.
    pub fn category_order(&self, fallback: CategoryOrder) -> CategoryOrder {
        if self.catsort != 0 {
            CategoryOrder::Numbered
        } else {
            fallback
        }
    }
}
