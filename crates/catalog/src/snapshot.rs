//! Per-device scan result and the primitives that patch it in place.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::item::GameItem;
use crate::naming::{parse_ordinal, strip_category_prefixes};
use crate::path::CatalogPath;
use crate::is_uncategorized;

/// How `category_names` is ordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryOrder {
    /// By on-disk ordinal; unnumbered names last.
    Numbered,
    /// By base name, case-insensitive.
    #[default]
    Alphabetical,
    /// By newest contained item.
    MostRecent,
}

/// Everything discovered on one device.
///
/// Invariants kept by every mutator:
/// - each item path is in exactly one of `uncategorized` or a category list,
///   and exactly once in `flat_all`;
/// - every list is sorted descending by `sort_key`, stable for equal keys;
/// - `index` maps each path to its category (`None` = uncategorized).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    categories: BTreeMap<String, Vec<GameItem>>,
    uncategorized: Vec<GameItem>,
    flat_all: Vec<GameItem>,
    category_names: Vec<String>,
    has_categories: bool,
    #[serde(skip)]
    index: HashMap<String, Option<String>>,
    #[serde(skip)]
    order: CategoryOrder,
}

/// Order-insensitive view of a snapshot, for comparing a patched snapshot
/// with a fresh scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotShape {
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub uncategorized: BTreeSet<String>,
    pub all: BTreeSet<String>,
}

fn insert_sorted(list: &mut Vec<GameItem>, item: GameItem) {
    let pos = list.partition_point(|existing| existing.sort_key >= item.sort_key);
    list.insert(pos, item);
}

fn remove_path(list: &mut Vec<GameItem>, path: &str) -> Option<GameItem> {
    let pos = list.iter().position(|item| item.path == path)?;
    Some(list.remove(pos))
}

impl ScanSnapshot {
    pub fn new(order: CategoryOrder) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    /// Drops every item and category.
    pub fn clear(&mut self) {
        self.categories.clear();
        self.uncategorized.clear();
        self.flat_all.clear();
        self.category_names.clear();
        self.has_categories = false;
        self.index.clear();
    }

    pub fn order(&self) -> CategoryOrder {
        self.order
    }

    /// Changes the category ordering and re-sorts `category_names`.
    pub fn set_order(&mut self, order: CategoryOrder) {
        self.order = order;
        self.refresh_category_names();
    }

    /// Makes sure a (possibly empty) category exists.
    pub fn register_category(&mut self, name: &str) {
        if is_uncategorized(name) {
            return;
        }
        if !self.categories.contains_key(name) {
            self.categories.insert(name.to_string(), Vec::new());
            self.refresh_category_names();
        }
    }

    /// Inserts or replaces an item under `category` (empty = uncategorized).
    ///
    /// An existing item with the same path is removed from wherever it was
    /// first, so the item can change category through this call.
    pub fn upsert_item(&mut self, item: GameItem, category: &str) {
        self.erase_path(&item.path);

        let category = (!is_uncategorized(category)).then(|| category.to_string());
        self.index.insert(item.path.clone(), category.clone());
        insert_sorted(&mut self.flat_all, item.clone());
        match category {
            Some(name) => {
                let is_new = !self.categories.contains_key(&name);
                insert_sorted(self.categories.entry(name).or_default(), item);
                if is_new || self.order == CategoryOrder::MostRecent {
                    self.refresh_category_names();
                }
            }
            None => insert_sorted(&mut self.uncategorized, item),
        }
    }

    /// Removes the item with `path` from every container.
    ///
    /// Returns the removed item; erasing an unknown path is a no-op.
    pub fn erase_path(&mut self, path: &str) -> Option<GameItem> {
        let category = self.index.remove(path)?;
        let removed = remove_path(&mut self.flat_all, path);
        match category {
            Some(name) => {
                if let Some(list) = self.categories.get_mut(&name) {
                    remove_path(list, path);
                }
                if self.order == CategoryOrder::MostRecent {
                    self.refresh_category_names();
                }
            }
            None => {
                remove_path(&mut self.uncategorized, path);
            }
        }
        removed
    }

    /// Re-keys category `old` as `new`, rewriting each contained item's
    /// category path component.
    ///
    /// When `new` already exists the lists are merged; an item whose
    /// rewritten path is already present is dropped (the destination copy
    /// wins, matching how folder merges resolve name clashes). Returns the
    /// `(old_path, new_path)` pairs that were rewritten.
    pub fn rename_category(&mut self, old: &str, new: &str) -> Vec<(String, String)> {
        if old == new || is_uncategorized(old) || is_uncategorized(new) {
            return Vec::new();
        }
        let Some(items) = self.categories.remove(old) else {
            return Vec::new();
        };
        self.categories.entry(new.to_string()).or_default();

        let mut rewritten = Vec::with_capacity(items.len());
        for mut item in items {
            let old_path = item.path.clone();
            self.index.remove(&old_path);
            remove_path(&mut self.flat_all, &old_path);

            let Some(mut parsed) = CatalogPath::parse(&old_path, item.kind) else {
                continue;
            };
            parsed.replace_category(new);
            let new_path = parsed.to_string();
            if self.index.contains_key(&new_path) {
                continue;
            }
            item.path = new_path.clone();
            self.index.insert(new_path.clone(), Some(new.to_string()));
            insert_sorted(&mut self.flat_all, item.clone());
            if let Some(list) = self.categories.get_mut(new) {
                insert_sorted(list, item);
            }
            rewritten.push((old_path, new_path));
        }
        self.refresh_category_names();
        rewritten
    }

    /// Recomputes `category_names` and `has_categories`.
    pub fn refresh_category_names(&mut self) {
        let mut names: Vec<String> = self.categories.keys().cloned().collect();
        match self.order {
            CategoryOrder::Numbered => names.sort_by(|a, b| {
                let oa = parse_ordinal(a).filter(|&o| o > 0).unwrap_or(u32::MAX);
                let ob = parse_ordinal(b).filter(|&o| o > 0).unwrap_or(u32::MAX);
                oa.cmp(&ob).then_with(|| alpha_key(a).cmp(&alpha_key(b)))
            }),
            CategoryOrder::Alphabetical => {
                names.sort_by(|a, b| alpha_key(a).cmp(&alpha_key(b)).then_with(|| a.cmp(b)))
            }
            CategoryOrder::MostRecent => {
                let newest = |name: &String| {
                    self.categories
                        .get(name)
                        .and_then(|list| list.first())
                        .map(|item| item.sort_key.clone())
                };
                names.sort_by(|a, b| {
                    // `None` (empty category) sorts last.
                    newest(b)
                        .cmp(&newest(a))
                        .then_with(|| alpha_key(a).cmp(&alpha_key(b)))
                });
            }
        }
        self.has_categories = !names.is_empty();
        self.category_names = names;
    }

    pub fn categories(&self) -> &BTreeMap<String, Vec<GameItem>> {
        &self.categories
    }

    /// Items of one category; `Uncategorized` or empty returns the
    /// uncategorized list.
    pub fn category(&self, name: &str) -> Option<&[GameItem]> {
        if is_uncategorized(name) {
            return Some(&self.uncategorized);
        }
        self.categories.get(name).map(Vec::as_slice)
    }

    pub fn uncategorized(&self) -> &[GameItem] {
        &self.uncategorized
    }

    pub fn flat_all(&self) -> &[GameItem] {
        &self.flat_all
    }

    pub fn category_names(&self) -> &[String] {
        &self.category_names
    }

    pub fn has_categories(&self) -> bool {
        self.has_categories
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    /// Category of an item: `Some(None)` when uncategorized, `None` when absent.
    pub fn category_of(&self, path: &str) -> Option<Option<&str>> {
        self.index.get(path).map(|c| c.as_deref())
    }

    pub fn item(&self, path: &str) -> Option<&GameItem> {
        self.flat_all.iter().find(|item| item.path == path)
    }

    pub fn len(&self) -> usize {
        self.flat_all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flat_all.is_empty()
    }

    /// Order-insensitive structural view.
    pub fn shape(&self) -> SnapshotShape {
        SnapshotShape {
            categories: self
                .categories
                .iter()
                .map(|(name, list)| {
                    (name.clone(), list.iter().map(|i| i.path.clone()).collect())
                })
                .collect(),
            uncategorized: self.uncategorized.iter().map(|i| i.path.clone()).collect(),
            all: self.flat_all.iter().map(|i| i.path.clone()).collect(),
        }
    }
}

fn alpha_key(name: &str) -> String {
    strip_category_prefixes(name).to_lowercase()
}
