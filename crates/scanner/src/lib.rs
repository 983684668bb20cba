//! Device scanner.
//!
//! Walks the fixed ISO and GAME roots of a device, classifies every entry
//! as a category folder, an app folder or a disc image, and builds a
//! [`ScanSnapshot`](kfe_catalog::ScanSnapshot). Scanning never fails: missing
//! roots are skipped and unreadable entries fall back to default metadata.

mod metadata;
mod scan;

pub use metadata::{MetadataReader, NoMetadata};
pub use scan::{CategoryFolder, ScanOptions, Scanner, category_candidates, is_video_folder};
