//! Path/category model and scan snapshots.
//!
//! Everything here is pure: mapping a device path to its subroot, category
//! and leaf (and back), the on-disk category naming scheme, name filters,
//! and the in-memory [`ScanSnapshot`] with the primitives used to patch it
//! after a transfer.

mod filter;
mod item;
mod naming;
mod path;
mod snapshot;

pub use filter::{Blacklist, is_app_marker, is_iso_like, is_junk_name};
pub use item::{GameItem, ItemKind, Timestamp};
pub use naming::{
    CATEGORY_PREFIX, MAX_ORDINAL, NamingScheme, format_category_name_from_base, parse_ordinal,
    strip_category_prefixes,
};
pub use path::{
    CatalogPath, GAME_ROOTS, ISO_ROOTS, after_subroot, build_dest_path, device_of, eq_ignore_case,
    join, parent_of, parse_category_from_path, subroot_for,
};
pub use snapshot::{CategoryOrder, ScanSnapshot, SnapshotShape};

/// Reserved pseudo-category for items that live directly under a subroot.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Memory stick device root.
pub const DEVICE_MS0: &str = "ms0:/";

/// Internal storage device root.
pub const DEVICE_EF0: &str = "ef0:/";

/// Marker file that identifies an app folder.
pub const APP_MARKER: &str = "EBOOT.PBP";

/// Returns `true` for an empty or reserved category name.
pub fn is_uncategorized(category: &str) -> bool {
    category.is_empty() || category == UNCATEGORIZED
}
