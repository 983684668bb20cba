use std::collections::HashSet;
use std::sync::Arc;

use kfe_scanner::MetadataReader;

/// Icon lookups with remembered misses.
///
/// Reading an icon means opening and parsing a container, so paths known
/// to have no icon are remembered, and the icon currently on screen is kept
/// decoded.
#[derive(Debug, Default)]
pub struct IconCache {
    missing: HashSet<String>,
    displayed: Option<(String, Arc<[u8]>)>,
}

impl IconCache {
    /// Icon bytes for `path`, consulting `reader` only on a cold lookup.
    pub fn icon_for(&mut self, reader: &dyn MetadataReader, path: &str) -> Option<Arc<[u8]>> {
        if self.missing.contains(path) {
            return None;
        }
        if let Some((shown, bytes)) = &self.displayed {
            if shown == path {
                return Some(Arc::clone(bytes));
            }
        }
        match reader.icon_bytes(path) {
            Some(bytes) => {
                let bytes: Arc<[u8]> = bytes.into();
                self.displayed = Some((path.to_string(), Arc::clone(&bytes)));
                Some(bytes)
            }
            None => {
                self.missing.insert(path.to_string());
                None
            }
        }
    }

    /// Path whose icon is currently held.
    pub fn displayed_path(&self) -> Option<&str> {
        self.displayed.as_ref().map(|(path, _)| path.as_str())
    }

    /// Whether `path` is known to have no icon.
    pub fn is_known_missing(&self, path: &str) -> bool {
        self.missing.contains(path)
    }

    /// Carries cached state from `old` to `new` after a rename.
    pub fn rekey(&mut self, old: &str, new: &str) {
        if self.missing.remove(old) {
            self.missing.insert(new.to_string());
        }
        if let Some((shown, _)) = &mut self.displayed {
            if shown == old {
                *shown = new.to_string();
            }
        }
    }

    /// Drops everything cached for `path`.
    pub fn forget(&mut self, path: &str) {
        self.missing.remove(path);
        if self.displayed_path() == Some(path) {
            self.displayed = None;
        }
    }

    pub fn clear(&mut self) {
        self.missing.clear();
        self.displayed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingReader {
        calls: AtomicUsize,
    }

    impl MetadataReader for CountingReader {
        fn title(&self, _path: &str) -> Option<String> {
            None
        }

        fn icon_bytes(&self, path: &str) -> Option<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            path.ends_with("withicon").then(|| vec![1, 2, 3])
        }
    }

    #[test]
    fn misses_are_remembered() {
        let reader = CountingReader::default();
        let mut icons = IconCache::default();
        assert!(icons.icon_for(&reader, "ms0:/PSP/GAME/A").is_none());
        assert!(icons.icon_for(&reader, "ms0:/PSP/GAME/A").is_none());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
        assert!(icons.is_known_missing("ms0:/PSP/GAME/A"));
    }

    #[test]
    fn displayed_icon_is_reused() {
        let reader = CountingReader::default();
        let mut icons = IconCache::default();
        let first = icons.icon_for(&reader, "ms0:/PSP/GAME/withicon").unwrap();
        let second = icons.icon_for(&reader, "ms0:/PSP/GAME/withicon").unwrap();
        assert_eq!(&*first, &[1, 2, 3]);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rekey_moves_both_caches() {
        let reader = CountingReader::default();
        let mut icons = IconCache::default();
        icons.icon_for(&reader, "ms0:/PSP/GAME/RPG/A");
        icons.icon_for(&reader, "ms0:/PSP/GAME/RPG/withicon");

        icons.rekey("ms0:/PSP/GAME/RPG/A", "ms0:/PSP/GAME/01RPG/A");
        icons.rekey("ms0:/PSP/GAME/RPG/withicon", "ms0:/PSP/GAME/01RPG/withicon");

        assert!(icons.is_known_missing("ms0:/PSP/GAME/01RPG/A"));
        assert!(!icons.is_known_missing("ms0:/PSP/GAME/RPG/A"));
        assert_eq!(icons.displayed_path(), Some("ms0:/PSP/GAME/01RPG/withicon"));
        assert!(icons.icon_for(&reader, "ms0:/PSP/GAME/01RPG/withicon").is_some());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn forget_drops_state() {
        let reader = CountingReader::default();
        let mut icons = IconCache::default();
        icons.icon_for(&reader, "ms0:/PSP/GAME/withicon");
        icons.forget("ms0:/PSP/GAME/withicon");
        assert!(icons.displayed_path().is_none());
    }
}
