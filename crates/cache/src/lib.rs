//! Snapshot cache.
//!
//! One [`ScanSnapshot`](kfe_catalog::ScanSnapshot) per device root, rescanned
//! only when dirty. Transfers and renames patch the cached snapshots in
//! place so routine operations never need a full rescan.

mod device;
mod icons;

pub use device::{DeviceCache, DeviceCacheEntry};
pub use icons::IconCache;
