//! Filesystem port over device-qualified paths.
//!
//! Every component above this crate addresses files as `ms0:/ISO/x.iso`.
//! The [`Storage`] trait is the only place those paths meet a real
//! filesystem; [`HostStorage`] maps each device root onto a host directory.

use std::io::{self, Read, Write};
use std::time::SystemTime;

use kfe_catalog::{device_of, parent_of};

mod host;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use host::HostStorage;

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Result of a stat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Synchronous filesystem operations on device paths.
///
/// Implementations must be usable from the foreground thread while the
/// free-space probe runs, hence `Send + Sync`.
pub trait Storage: Send + Sync {
    /// Lists a directory (unsorted, without `.`/`..`).
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    fn metadata(&self, path: &str) -> io::Result<EntryMeta>;

    fn create_dir(&self, path: &str) -> io::Result<()>;

    fn remove_file(&self, path: &str) -> io::Result<()>;

    /// Removes an empty directory.
    fn remove_dir(&self, path: &str) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Opens a file for streaming reads.
    fn open_read(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Creates (or truncates) a file for streaming writes.
    fn open_write(&self, path: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Vendor same-volume move primitive (metadata only).
    fn devctl_move(&self, from: &str, to: &str) -> io::Result<()> {
        let _ = (from, to);
        Err(io::Error::new(io::ErrorKind::Unsupported, "devctl move not supported"))
    }

    fn exists(&self, path: &str) -> bool {
        self.metadata(path).is_ok()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.metadata(path).is_ok_and(|m| m.is_dir)
    }

    /// Creates `path` and any missing parents.
    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        let path = path.trim_end_matches('/');
        if path.is_empty() || path.ends_with(':') || self.is_dir(path) {
            return Ok(());
        }
        if let Some(parent) = parent_of(path) {
            self.create_dir_all(parent)?;
        }
        match self.create_dir(path) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && self.is_dir(path) => Ok(()),
            other => other,
        }
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.open_read(path)?.read_to_end(&mut data)?;
        Ok(data)
    }

    fn write_file(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut out = self.open_write(path)?;
        out.write_all(data)?;
        out.flush()
    }

    /// Whether two paths live on the same physical device.
    fn same_physical_device(&self, a: &str, b: &str) -> bool {
        match (device_of(a), device_of(b)) {
            (Some(da), Some(db)) => da.eq_ignore_ascii_case(db),
            _ => false,
        }
    }
}

/// Source of free-space readings (the device-control query).
pub trait FreeSpaceSource: Send + Sync {
    /// Free bytes on `device` (`"ms0:/"`). May be slow.
    fn free_bytes(&self, device: &str) -> io::Result<u64>;
}

/// Recursive size of a file or directory; unreadable entries count as 0.
pub fn path_size(storage: &dyn Storage, path: &str) -> u64 {
    let Ok(meta) = storage.metadata(path) else {
        return 0;
    };
    if !meta.is_dir {
        return meta.size;
    }
    let Ok(entries) = storage.read_dir(path) else {
        return 0;
    };
    let mut total = 0;
    for entry in entries {
        let child = kfe_catalog::join(path, &entry.name);
        total += if entry.is_dir {
            path_size(storage, &child)
        } else {
            storage.metadata(&child).map(|m| m.size).unwrap_or(0)
        };
        std::thread::yield_now();
    }
    total
}

/// Removes a file, or a directory and everything below it (children first).
pub fn remove_tree(storage: &dyn Storage, path: &str) -> io::Result<()> {
    if !storage.metadata(path)?.is_dir {
        return storage.remove_file(path);
    }
    for entry in storage.read_dir(path)? {
        let child = kfe_catalog::join(path, &entry.name);
        if entry.is_dir {
            remove_tree(storage, &child)?;
        } else {
            storage.remove_file(&child)?;
        }
        std::thread::yield_now();
    }
    storage.remove_dir(path)
}
