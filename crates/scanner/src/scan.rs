use std::sync::Arc;

use kfe_catalog::{
    Blacklist, CategoryOrder, GAME_ROOTS, GameItem, ISO_ROOTS, ItemKind, ScanSnapshot, Timestamp,
    is_app_marker, is_iso_like, is_junk_name, join,
};
use kfe_storage::{DirEntry, Storage, path_size};

use crate::metadata::MetadataReader;

/// Folder under the ISO root that holds videos, never a category.
const VIDEO_FOLDER: &str = "VIDEO";

/// Per-scan inputs that come from settings.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub blacklist: Blacklist,
    pub order: CategoryOrder,
}

/// A folder that sits where a category would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFolder {
    /// Root directory without trailing slash (`ms0:/ISO`).
    pub root_dir: String,
    /// Canonical subroot (`ISO/`, `PSP/GAME/`, ...).
    pub subroot: &'static str,
    /// On-disk folder name.
    pub name: String,
    /// Whether the name matched the blacklist.
    pub blacklisted: bool,
}

impl CategoryFolder {
    pub fn path(&self) -> String {
        join(&self.root_dir, &self.name)
    }
}

/// Returns `true` for the reserved video folder under the ISO root.
pub fn is_video_folder(name: &str) -> bool {
    name.eq_ignore_ascii_case(VIDEO_FOLDER)
}

fn root_dir(device: &str, subroot: &str) -> String {
    format!("{device}{}", subroot.trim_end_matches('/'))
}

/// Lists a directory without junk entries, sorted by name.
///
/// Unreadable directories read as empty.
fn list(storage: &dyn Storage, dir: &str) -> Vec<DirEntry> {
    let mut entries = match storage.read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir, error = %e, "skipping unreadable directory");
            return Vec::new();
        }
    };
    entries.retain(|entry| !is_junk_name(&entry.name));
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

fn contains_app_marker(storage: &dyn Storage, dir: &str) -> bool {
    list(storage, dir)
        .iter()
        .any(|entry| !entry.is_dir && is_app_marker(&entry.name))
}

/// Every folder on `device` that the scanner treats as a category
/// candidate, blacklisted ones included (flagged).
///
/// ISO-root children are always candidates except the video folder; a
/// GAME-root child is a candidate unless it is itself an app folder.
pub fn category_candidates(storage: &dyn Storage, device: &str, blacklist: &Blacklist) -> Vec<CategoryFolder> {
    let mut out = Vec::new();
    for &subroot in ISO_ROOTS {
        let dir = root_dir(device, subroot);
        for entry in list(storage, &dir) {
            if !entry.is_dir || is_video_folder(&entry.name) {
                continue;
            }
            out.push(CategoryFolder {
                blacklisted: blacklist.matches(&entry.name),
                root_dir: dir.clone(),
                subroot,
                name: entry.name,
            });
        }
    }
    for &subroot in GAME_ROOTS {
        let dir = root_dir(device, subroot);
        for entry in list(storage, &dir) {
            if !entry.is_dir || contains_app_marker(storage, &join(&dir, &entry.name)) {
                continue;
            }
            out.push(CategoryFolder {
                blacklisted: blacklist.matches(&entry.name),
                root_dir: dir.clone(),
                subroot,
                name: entry.name,
            });
        }
    }
    out
}

/// Builds snapshots from a [`Storage`].
#[derive(Clone)]
pub struct Scanner {
    storage: Arc<dyn Storage>,
    metadata: Arc<dyn MetadataReader>,
}

impl Scanner {
    pub fn new(storage: Arc<dyn Storage>, metadata: Arc<dyn MetadataReader>) -> Self {
        Self { storage, metadata }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataReader> {
        &self.metadata
    }

    /// Returns `true` if `path` is a directory holding the app marker.
    pub fn is_app_folder(&self, path: &str) -> bool {
        contains_app_marker(self.storage.as_ref(), path)
    }

    /// Reads fresh metadata for one item.
    ///
    /// A failed stat leaves the time and size at their defaults.
    pub fn make_item_for(&self, path: &str, kind: ItemKind) -> GameItem {
        let (time, size) = match self.storage.metadata(path) {
            Ok(meta) => {
                let time = meta
                    .modified
                    .map(Timestamp::from_system_time)
                    .unwrap_or_default();
                let size = if meta.is_dir {
                    path_size(self.storage.as_ref(), path)
                } else {
                    meta.size
                };
                (time, size)
            }
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "stat failed, using defaults");
                (Timestamp::default(), 0)
            }
        };
        GameItem::new(kind, path, time, size).with_title(self.metadata.title(path))
    }

    /// Scans every root of `device` into a new snapshot.
    pub fn scan_device(&self, device: &str, options: &ScanOptions) -> ScanSnapshot {
        let mut snapshot = ScanSnapshot::new(options.order);
        self.scan_into(device, options, &mut snapshot);
        snapshot
    }

    /// Rebuilds `snapshot` in place from a scan of `device`.
    pub fn scan_into(&self, device: &str, options: &ScanOptions, snapshot: &mut ScanSnapshot) {
        snapshot.clear();
        snapshot.set_order(options.order);
        let storage = self.storage.as_ref();

        for &subroot in ISO_ROOTS {
            let dir = root_dir(device, subroot);
            for entry in list(storage, &dir) {
                let path = join(&dir, &entry.name);
                if !entry.is_dir {
                    if is_iso_like(&entry.name) {
                        snapshot.upsert_item(self.make_item_for(&path, ItemKind::IsoFile), "");
                    }
                    continue;
                }
                if is_video_folder(&entry.name) || options.blacklist.matches(&entry.name) {
                    continue;
                }
                snapshot.register_category(&entry.name);
                for child in list(storage, &path) {
                    if !child.is_dir && is_iso_like(&child.name) {
                        let item = self.make_item_for(&join(&path, &child.name), ItemKind::IsoFile);
                        snapshot.upsert_item(item, &entry.name);
                    }
                    std::thread::yield_now();
                }
            }
        }

        for &subroot in GAME_ROOTS {
            let dir = root_dir(device, subroot);
            for entry in list(storage, &dir) {
                if !entry.is_dir {
                    continue;
                }
                let path = join(&dir, &entry.name);
                if self.is_app_folder(&path) {
                    snapshot.upsert_item(self.make_item_for(&path, ItemKind::EbootFolder), "");
                    continue;
                }
                if options.blacklist.matches(&entry.name) {
                    continue;
                }
                snapshot.register_category(&entry.name);
                for child in list(storage, &path) {
                    let child_path = join(&path, &child.name);
                    if child.is_dir && self.is_app_folder(&child_path) {
                        let item = self.make_item_for(&child_path, ItemKind::EbootFolder);
                        snapshot.upsert_item(item, &entry.name);
                    }
                    std::thread::yield_now();
                }
            }
        }

        tracing::info!(
            device,
            items = snapshot.len(),
            categories = snapshot.category_names().len(),
            "device scanned"
        );
    }
}
