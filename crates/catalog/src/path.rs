//! Device path model: `<device><subroot>[<category>/]<leaf>`.

use std::fmt;

use crate::item::ItemKind;
use crate::is_uncategorized;

/// Subroots that hold ISO images (directly or one category deep).
pub const ISO_ROOTS: &[&str] = &["ISO/"];

/// Subroots that hold app folders (directly or one category deep).
pub const GAME_ROOTS: &[&str] = &["PSP/GAME/", "PSP/GAME150/"];

/// Case-insensitive ASCII comparison (the device filesystems are FAT-like).
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Returns the device root (`"ms0:/"`) of a path, if it has one.
pub fn device_of(path: &str) -> Option<&str> {
    path.find(":/").map(|i| &path[..i + 2])
}

fn strip_device(path: &str) -> &str {
    match device_of(path) {
        Some(device) => &path[device.len()..],
        None => path,
    }
}

/// Returns the known subroot that prefixes `path` after its device root.
///
/// Falls back to `ISO/` or `PSP/GAME/` (by kind) when nothing matches.
pub fn subroot_for(path: &str, kind: ItemKind) -> &'static str {
    let rest = strip_device(path);
    ISO_ROOTS
        .iter()
        .chain(GAME_ROOTS.iter())
        .find(|root| starts_with_ignore_case(rest, root))
        .copied()
        .unwrap_or(match kind {
            ItemKind::IsoFile => ISO_ROOTS[0],
            ItemKind::EbootFolder => GAME_ROOTS[0],
        })
}

/// Returns what follows `<device><subroot>` in `path`.
pub fn after_subroot<'a>(path: &'a str, subroot: &str) -> &'a str {
    let rest = strip_device(path);
    if starts_with_ignore_case(rest, subroot) {
        &rest[subroot.len()..]
    } else {
        rest
    }
}

/// Splits a subroot tail into `(category, leaf)`.
///
/// The first segment is the category when the tail has more than one
/// segment; otherwise the category is empty (uncategorized).
pub fn parse_category_from_path(tail: &str) -> (String, String) {
    let tail = tail.trim_matches('/');
    match tail.split_once('/') {
        Some((category, leaf)) => (category.to_string(), leaf.to_string()),
        None => (String::new(), tail.to_string()),
    }
}

/// Computes where `src` lands on `dest_device` under `dest_category`.
///
/// The subroot is preserved; an empty or `Uncategorized` category puts the
/// item directly under the subroot.
pub fn build_dest_path(src: &str, kind: ItemKind, dest_device: &str, dest_category: &str) -> String {
    let subroot = subroot_for(src, kind);
    let (_, leaf) = parse_category_from_path(after_subroot(src, subroot));
    let leaf = leaf.rsplit('/').next().unwrap_or_default();
    let mut out = String::with_capacity(dest_device.len() + subroot.len() + leaf.len() + 16);
    out.push_str(dest_device);
    out.push_str(subroot);
    if !is_uncategorized(dest_category) {
        out.push_str(dest_category);
        out.push('/');
    }
    out.push_str(leaf);
    out
}

/// Joins a directory and an entry name with exactly one `/`.
pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Returns the parent directory of `path` (`"ms0:/"` for top-level entries).
pub fn parent_of(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let parent = &trimmed[..idx];
    if parent.ends_with(':') {
        Some(&trimmed[..idx + 1])
    } else {
        Some(parent)
    }
}

/// A catalog path split into its components.
///
/// Category surgery goes through this type instead of substring
/// replacement, so a category name that also appears in the leaf is never
/// touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPath {
    pub device: String,
    /// Subroot as spelled in the parsed path (always ends in `/`).
    pub subroot: String,
    pub category: Option<String>,
    pub leaf: String,
}

impl CatalogPath {
    /// Parses a device path; `None` when it has no device root or no leaf.
    pub fn parse(path: &str, kind: ItemKind) -> Option<Self> {
        let device = device_of(path)?;
        let canonical = subroot_for(path, kind);
        let rest = &path[device.len()..];
        let subroot = if starts_with_ignore_case(rest, canonical) {
            rest[..canonical.len()].to_string()
        } else {
            canonical.to_string()
        };
        let (category, leaf) = parse_category_from_path(after_subroot(path, canonical));
        if leaf.is_empty() {
            return None;
        }
        Some(Self {
            device: device.to_string(),
            subroot,
            category: (!category.is_empty()).then_some(category),
            leaf,
        })
    }

    /// Category name, empty for uncategorized.
    pub fn category_name(&self) -> &str {
        self.category.as_deref().unwrap_or_default()
    }

    /// Replaces the category component; empty or `Uncategorized` clears it.
    pub fn replace_category(&mut self, category: &str) {
        self.category = (!is_uncategorized(category)).then(|| category.to_string());
    }

    /// Directory that contains the item.
    pub fn container(&self) -> String {
        match &self.category {
            Some(category) => format!("{}{}{}", self.device, self.subroot, category),
            None => format!("{}{}", self.device, self.subroot.trim_end_matches('/')),
        }
    }
}

impl fmt::Display for CatalogPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.device, self.subroot)?;
        if let Some(category) = &self.category {
            write!(f, "{category}/")?;
        }
        write!(f, "{}", self.leaf)
    }
}
