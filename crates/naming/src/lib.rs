//! Category naming enforcer.
//!
//! Brings every category folder on a device in line with the current
//! [`NamingScheme`](kfe_catalog::NamingScheme): numbering and `CAT_` prefix
//! are added or removed, ordinals are made a permutation of `1..=N`, and
//! duplicate folders of one category are merged.

mod enforce;
mod merge;

pub use enforce::{assign_ordinals, enforce_category_scheme_for_device};
pub use merge::merge_dirs;

use serde::Serialize;

/// One folder renamed (or merged into another) by the enforcer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRename {
    /// Root directory holding the folder (`ms0:/ISO`).
    pub root_dir: String,
    pub from: String,
    pub to: String,
    /// `true` when `from` was merged into an existing `to`.
    pub merged: bool,
}

/// What an enforcement pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforceReport {
    /// Ordinal chosen per base name (0 when numbering is off).
    pub ordinals: Vec<(String, u32)>,
    pub renames: Vec<FolderRename>,
    /// Blacklisted folders renamed to their bare base name.
    pub normalized: Vec<FolderRename>,
    /// Bases left without an ordinal because two digits ran out.
    pub unnumbered: Vec<String>,
    pub failures: usize,
}

impl EnforceReport {
    /// Distinct category key changes to replay on a cached snapshot, in
    /// the order they happened.
    pub fn category_renames(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for rename in &self.renames {
            let pair = (rename.from.clone(), rename.to.clone());
            if !out.contains(&pair) {
                out.push(pair);
            }
        }
        out
    }

    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }

    /// Whether anything on disk changed.
    pub fn changed(&self) -> bool {
        !self.renames.is_empty() || !self.normalized.is_empty()
    }
}
