use std::collections::HashMap;
use std::sync::Arc;

use kfe_catalog::{CatalogPath, GameItem, ItemKind, ScanSnapshot, device_of};
use kfe_scanner::{ScanOptions, Scanner};

use crate::icons::IconCache;

/// A cached snapshot and whether it still matches the disk.
#[derive(Debug, Clone)]
pub struct DeviceCacheEntry {
    pub snapshot: ScanSnapshot,
    pub dirty: bool,
}

impl Default for DeviceCacheEntry {
    fn default() -> Self {
        Self {
            snapshot: ScanSnapshot::default(),
            dirty: true,
        }
    }
}

/// Snapshots keyed by device root (`"ms0:/"`).
///
/// Only the foreground thread touches the cache, so it takes `&mut self`
/// and carries no locks.
pub struct DeviceCache {
    scanner: Scanner,
    entries: HashMap<String, DeviceCacheEntry>,
    options: HashMap<String, ScanOptions>,
    icons: IconCache,
}

impl DeviceCache {
    pub fn new(scanner: Scanner) -> Self {
        Self {
            scanner,
            entries: HashMap::new(),
            options: HashMap::new(),
            icons: IconCache::default(),
        }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Sets the blacklist and category order used when `device` is scanned.
    ///
    /// The order is applied to a cached snapshot right away; a blacklist
    /// change marks the device dirty.
    pub fn set_scan_options(&mut self, device: &str, options: ScanOptions) {
        let blacklist_changed = self
            .options
            .get(device)
            .is_none_or(|old| old.blacklist != options.blacklist);
        if let Some(entry) = self.entries.get_mut(device) {
            entry.snapshot.set_order(options.order);
            if blacklist_changed {
                entry.dirty = true;
            }
        }
        self.options.insert(device.to_string(), options);
    }

    /// Entry for `device`, created dirty on first reference.
    pub fn get(&mut self, device: &str) -> &DeviceCacheEntry {
        self.entries.entry(device.to_string()).or_default()
    }

    /// Cached snapshot, if the device was ever referenced.
    pub fn snapshot(&self, device: &str) -> Option<&ScanSnapshot> {
        self.entries.get(device).map(|entry| &entry.snapshot)
    }

    /// Rescans `device` if its snapshot is dirty and returns the snapshot.
    pub fn ensure_fresh(&mut self, device: &str) -> &ScanSnapshot {
        let options = self.options.get(device).cloned().unwrap_or_default();
        let entry = self.entries.entry(device.to_string()).or_default();
        if entry.dirty {
            self.scanner.scan_into(device, &options, &mut entry.snapshot);
            entry.dirty = false;
        }
        &entry.snapshot
    }

    pub fn mark_dirty(&mut self, device: &str) {
        self.entries.entry(device.to_string()).or_default().dirty = true;
        tracing::debug!(device, "snapshot marked dirty");
    }

    /// Declares a patched snapshot current.
    pub fn mark_clean(&mut self, device: &str) {
        if let Some(entry) = self.entries.get_mut(device) {
            entry.dirty = false;
        }
    }

    /// Whether the next access must rescan. Unknown devices are dirty.
    pub fn is_dirty(&self, device: &str) -> bool {
        self.entries.get(device).is_none_or(|entry| entry.dirty)
    }

    /// Marks every cached device dirty.
    pub fn invalidate_all(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = true;
        }
        self.icons.clear();
    }

    /// Snapshot to patch for `path`; dirty snapshots are left alone since the
    /// next access rescans them anyway.
    fn patchable(&mut self, path: &str) -> Option<&mut ScanSnapshot> {
        let device = device_of(path)?;
        self.entries
            .get_mut(device)
            .filter(|entry| !entry.dirty)
            .map(|entry| &mut entry.snapshot)
    }

    /// Removes `path` from its device's snapshot.
    pub fn erase_path(&mut self, path: &str) -> Option<GameItem> {
        self.icons.forget(path);
        self.patchable(path)?.erase_path(path)
    }

    /// Inserts or replaces `item` in its device's snapshot.
    pub fn upsert_item(&mut self, item: GameItem, category: &str) {
        let path = item.path.clone();
        if let Some(snapshot) = self.patchable(&path) {
            snapshot.upsert_item(item, category);
        }
    }

    /// Reflects one finished transfer in the cached snapshots.
    ///
    /// A move erases `src_path` from the source snapshot. The destination is
    /// always re-read from disk and upserted under the category its path
    /// implies.
    pub fn apply_move_or_copy(&mut self, src_path: &str, dst_path: &str, kind: ItemKind, is_move: bool) {
        if is_move {
            self.erase_path(src_path);
        }
        let category = CatalogPath::parse(dst_path, kind)
            .map(|parsed| parsed.category_name().to_string())
            .unwrap_or_default();
        if self.patchable(dst_path).is_none() {
            return;
        }
        let item = self.scanner.make_item_for(dst_path, kind);
        self.upsert_item(item, &category);
    }

    /// Re-keys category `old` as `new` on `device`, carrying icon state along.
    ///
    /// Returns the number of items whose path was rewritten.
    pub fn rename_category(&mut self, device: &str, old: &str, new: &str) -> usize {
        let Some(entry) = self.entries.get_mut(device).filter(|entry| !entry.dirty) else {
            return 0;
        };
        let rewritten = entry.snapshot.rename_category(old, new);
        for (old_path, new_path) in &rewritten {
            self.icons.rekey(old_path, new_path);
        }
        tracing::debug!(device, old, new, items = rewritten.len(), "category renamed in cache");
        rewritten.len()
    }

    /// Icon for an item, read through the scanner's metadata reader.
    pub fn icon_for(&mut self, path: &str) -> Option<Arc<[u8]>> {
        let reader = Arc::clone(self.scanner.metadata());
        self.icons.icon_for(reader.as_ref(), path)
    }

    pub fn icons(&self) -> &IconCache {
        &self.icons
    }
}
