use std::collections::BTreeMap;

use kfe_catalog::{ItemKind, ScanSnapshot};
use kfe_transfer::SourceItem;

/// Checked items, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    checked: BTreeMap<String, ItemKind>,
}

impl Selection {
    /// Flips the check mark of `path`; returns whether it is now checked.
    pub fn toggle(&mut self, path: &str, kind: ItemKind) -> bool {
        if self.checked.remove(path).is_some() {
            false
        } else {
            self.checked.insert(path.to_string(), kind);
            true
        }
    }

    pub fn check(&mut self, path: &str, kind: ItemKind) {
        self.checked.insert(path.to_string(), kind);
    }

    pub fn uncheck(&mut self, path: &str) -> bool {
        self.checked.remove(path).is_some()
    }

    pub fn is_checked(&self, path: &str) -> bool {
        self.checked.contains_key(path)
    }

    pub fn clear(&mut self) {
        self.checked.clear();
    }

    pub fn len(&self) -> usize {
        self.checked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checked.is_empty()
    }

    /// Checks every item of a category (or of the uncategorized list).
    pub fn check_category(&mut self, snapshot: &ScanSnapshot, category: Option<&str>) {
        let items = match category {
            Some(name) => snapshot.category(name).unwrap_or_default(),
            None => snapshot.uncategorized(),
        };
        for item in items {
            self.check(&item.path, item.kind);
        }
    }

    /// Drops checked paths that `snapshot` no longer lists on its device.
    pub fn retain_in(&mut self, device: &str, snapshot: &ScanSnapshot) {
        self.checked
            .retain(|path, _| !path.starts_with(device) || snapshot.contains(path));
    }

    /// Sources for an operation: the checked items, else `focused`.
    pub fn sources(&self, focused: Option<SourceItem>) -> Vec<SourceItem> {
        if self.checked.is_empty() {
            return focused.into_iter().collect();
        }
        self.checked
            .iter()
            .map(|(path, kind)| SourceItem::new(path.clone(), *kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kfe_catalog::{CategoryOrder, GameItem, Timestamp};

    #[test]
    fn focused_item_is_used_when_nothing_is_checked() {
        let mut selection = Selection::default();
        let focused = SourceItem::new("ms0:/ISO/a.iso", ItemKind::IsoFile);
        assert_eq!(selection.sources(Some(focused.clone())), vec![focused.clone()]);
        assert!(selection.sources(None).is_empty());

        assert!(selection.toggle("ms0:/PSP/GAME/Foo", ItemKind::EbootFolder));
        assert_eq!(
            selection.sources(Some(focused)),
            vec![SourceItem::new("ms0:/PSP/GAME/Foo", ItemKind::EbootFolder)]
        );
        assert!(!selection.toggle("ms0:/PSP/GAME/Foo", ItemKind::EbootFolder));
        assert!(selection.is_empty());
    }

    #[test]
    fn check_category_and_retain() {
        let mut snap = ScanSnapshot::new(CategoryOrder::Alphabetical);
        for path in ["ms0:/ISO/RPG/a.iso", "ms0:/ISO/RPG/b.iso"] {
            snap.upsert_item(GameItem::new(ItemKind::IsoFile, path, Timestamp::default(), 1), "RPG");
        }
        let mut selection = Selection::default();
        selection.check_category(&snap, Some("RPG"));
        selection.check("ef0:/ISO/c.iso", ItemKind::IsoFile);
        assert_eq!(selection.len(), 3);

        snap.erase_path("ms0:/ISO/RPG/a.iso");
        selection.retain_in("ms0:/", &snap);
        assert!(!selection.is_checked("ms0:/ISO/RPG/a.iso"));
        assert!(selection.is_checked("ms0:/ISO/RPG/b.iso"));
        assert!(selection.is_checked("ef0:/ISO/c.iso"));
    }
}
