//! Discovered apps and ISO images.

use std::time::SystemTime;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// How an item is stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    /// A single disc image file (`.iso`, `.cso`, ...).
    IsoFile,
    /// A directory holding an `EBOOT.PBP`.
    EbootFolder,
}

impl ItemKind {
    /// Returns `true` if the item is a directory on disk.
    pub fn is_folder(self) -> bool {
        matches!(self, ItemKind::EbootFolder)
    }
}

/// Modification time as the device reports it.
///
/// Fields are signed because the firmware occasionally hands back garbage
/// (negative or out-of-range values); [`Timestamp::sort_key`] clamps them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub year: i32,
    pub month: i32,
    pub day: i32,
    pub hour: i32,
    pub minute: i32,
    pub second: i32,
    pub microsecond: i32,
}

impl Timestamp {
    /// Converts a host modification time (UTC).
    pub fn from_system_time(time: SystemTime) -> Self {
        let dt: DateTime<Utc> = time.into();
        Self {
            year: dt.year(),
            month: dt.month() as i32,
            day: dt.day() as i32,
            hour: dt.hour() as i32,
            minute: dt.minute() as i32,
            second: dt.second() as i32,
            microsecond: (dt.nanosecond() / 1_000).min(999_999) as i32,
        }
    }

    /// Fixed-width key (`YYYYMMDDhhmmssuuuuuu`) that sorts like the timestamp.
    pub fn sort_key(&self) -> String {
        fn clamp(v: i32, max: i32) -> i32 {
            v.clamp(0, max)
        }
        format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}{:06}",
            clamp(self.year, 9999),
            clamp(self.month, 99),
            clamp(self.day, 99),
            clamp(self.hour, 99),
            clamp(self.minute, 99),
            clamp(self.second, 99),
            clamp(self.microsecond, 999_999),
        )
    }
}

/// One discovered app or ISO.
///
/// Items are plain values copied into every container they belong to;
/// identity is the `path` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameItem {
    pub kind: ItemKind,
    /// File or folder name.
    pub label: String,
    /// Title extracted by the metadata reader, if any.
    pub title: Option<String>,
    /// Absolute device path, without a trailing slash.
    pub path: String,
    pub time: Timestamp,
    pub sort_key: String,
    pub size_bytes: u64,
}

impl GameItem {
    /// Builds an item with the sort key derived from `time`.
    pub fn new(kind: ItemKind, path: impl Into<String>, time: Timestamp, size_bytes: u64) -> Self {
        let path = path.into();
        let label = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            kind,
            label,
            title: None,
            sort_key: time.sort_key(),
            path,
            time,
            size_bytes,
        }
    }

    /// Sets the extracted title.
    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    /// Name to show: the title when known, otherwise the label.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_is_fixed_width() {
        let ts = Timestamp {
            year: 2009,
            month: 3,
            day: 7,
            hour: 1,
            minute: 2,
            second: 3,
            microsecond: 45,
        };
        assert_eq!(ts.sort_key(), "20090307010203000045");
        assert_eq!(Timestamp::default().sort_key().len(), 20);
    }

    #[test]
    fn sort_key_clamps_garbage_fields() {
        let ts = Timestamp {
            year: -5,
            month: 250,
            day: -1,
            hour: 0,
            minute: 0,
            second: 0,
            microsecond: -10,
        };
        assert_eq!(ts.sort_key(), "00009900000000000000");
    }

    #[test]
    fn sort_key_orders_like_time() {
        let older = Timestamp {
            year: 2010,
            month: 12,
            day: 31,
            ..Timestamp::default()
        };
        let newer = Timestamp {
            year: 2011,
            month: 1,
            day: 1,
            ..Timestamp::default()
        };
        assert!(newer.sort_key() > older.sort_key());
    }

    #[test]
    fn from_system_time_epoch() {
        let ts = Timestamp::from_system_time(SystemTime::UNIX_EPOCH);
        assert_eq!(ts.year, 1970);
        assert_eq!(ts.month, 1);
        assert_eq!(ts.day, 1);
        assert_eq!(ts.sort_key(), "19700101000000000000");
    }

    #[test]
    fn label_is_last_segment() {
        let item = GameItem::new(
            ItemKind::EbootFolder,
            "ms0:/PSP/GAME/RPG/Foo",
            Timestamp::default(),
            0,
        );
        assert_eq!(item.label, "Foo");
        assert_eq!(item.display_name(), "Foo");

        let titled = item.with_title(Some("Foo Adventures".into()));
        assert_eq!(titled.display_name(), "Foo Adventures");
    }

    #[test]
    fn item_serialization() {
        let item = GameItem::new(ItemKind::IsoFile, "ms0:/ISO/a.iso", Timestamp::default(), 7);
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"kind\":\"isoFile\""));
        assert!(json.contains("\"sizeBytes\":7"));
    }
}
