//! Device roots mapped onto host directories.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use kfe_catalog::device_of;

use crate::{DirEntry, EntryMeta, FreeSpaceSource, Storage};

/// [`Storage`] backed by the host filesystem.
///
/// `ms0:/ISO/a.iso` resolves to `<root of ms0:/>/ISO/a.iso`.
#[derive(Debug, Clone)]
pub struct HostStorage {
    roots: HashMap<String, PathBuf>,
}

impl HostStorage {
    /// Creates a storage from `(device root, host directory)` pairs.
    pub fn new<I, D, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = (D, P)>,
        D: AsRef<str>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|(device, dir)| (device.as_ref().to_ascii_lowercase(), dir.as_ref().to_path_buf()))
            .collect();
        Self { roots }
    }

    /// Device roots this storage knows about, sorted.
    pub fn devices(&self) -> Vec<String> {
        let mut devices: Vec<String> = self.roots.keys().cloned().collect();
        devices.sort();
        devices
    }

    /// Whether `device` is mapped and its host directory exists.
    pub fn is_present(&self, device: &str) -> bool {
        self.roots
            .get(&device.to_ascii_lowercase())
            .is_some_and(|dir| dir.is_dir())
    }

    /// Translates a device path into a host path.
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let device = device_of(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("not a device path: {path}"))
        })?;
        let root = self.roots.get(&device.to_ascii_lowercase()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("device not mapped: {device}"))
        })?;
        let mut out = root.clone();
        for segment in path[device.len()..].split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("relative segment in path: {path}"),
                ));
            }
            out.push(segment);
        }
        Ok(out)
    }
}

impl Storage for HostStorage {
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let dir = self.resolve(path)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)?.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            out.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(out)
    }

    fn metadata(&self, path: &str) -> io::Result<EntryMeta> {
        let meta = fs::metadata(self.resolve(path)?)?;
        Ok(EntryMeta {
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
        })
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        fs::create_dir(self.resolve(path)?)
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path)?)
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.resolve(path)?)
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        fs::remove_dir(self.resolve(path)?)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn open_read(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(self.resolve(path)?)?))
    }

    fn open_write(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        Ok(Box::new(fs::File::create(self.resolve(path)?)?))
    }

    /// Same-device move. The host has no devctl, so this is a rename that
    /// refuses to cross device roots.
    fn devctl_move(&self, from: &str, to: &str) -> io::Result<()> {
        if !self.same_physical_device(from, to) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "devctl move across devices",
            ));
        }
        self.rename(from, to)
    }
}

impl FreeSpaceSource for HostStorage {
    fn free_bytes(&self, device: &str) -> io::Result<u64> {
        let root = self.resolve(device)?;
        host_free_bytes(&root)
    }
}

#[cfg(unix)]
fn host_free_bytes(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is a valid NUL-terminated string and stat is a valid out-pointer.
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn host_free_bytes(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space query not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(tmp: &tempfile::TempDir) -> HostStorage {
        HostStorage::new([("ms0:/", tmp.path())])
    }

    #[test]
    fn resolve_maps_device_root() {
        let tmp = tempfile::tempdir().unwrap();
        let s = storage(&tmp);
        assert_eq!(
            s.resolve("ms0:/ISO/RPG/a.iso").unwrap(),
            tmp.path().join("ISO").join("RPG").join("a.iso")
        );
        assert_eq!(s.resolve("MS0:/").unwrap(), tmp.path());
    }

    #[test]
    fn resolve_rejects_unknown_and_relative() {
        let tmp = tempfile::tempdir().unwrap();
        let s = storage(&tmp);
        assert_eq!(
            s.resolve("ef0:/ISO").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            s.resolve("ISO/a.iso").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
        assert_eq!(
            s.resolve("ms0:/ISO/../../etc").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }

    #[test]
    fn read_dir_and_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let s = storage(&tmp);
        s.create_dir_all("ms0:/ISO/RPG").unwrap();
        s.write_file("ms0:/ISO/a.iso", b"abcd").unwrap();

        let mut entries = s.read_dir("ms0:/ISO").unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            entries,
            vec![
                DirEntry {
                    name: "RPG".into(),
                    is_dir: true
                },
                DirEntry {
                    name: "a.iso".into(),
                    is_dir: false
                },
            ]
        );

        let meta = s.metadata("ms0:/ISO/a.iso").unwrap();
        assert!(!meta.is_dir);
        assert_eq!(meta.size, 4);
        assert!(meta.modified.is_some());
        assert!(s.metadata("ms0:/ISO/missing").is_err());
    }

    #[test]
    fn devctl_move_stays_on_device() {
        let tmp = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let s = HostStorage::new([("ms0:/", tmp.path()), ("ef0:/", other.path())]);
        s.write_file("ms0:/a.iso", b"x").unwrap();

        s.devctl_move("ms0:/a.iso", "ms0:/b.iso").unwrap();
        assert!(s.exists("ms0:/b.iso"));

        let err = s.devctl_move("ms0:/b.iso", "ef0:/b.iso").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[test]
    fn presence_and_devices() {
        let tmp = tempfile::tempdir().unwrap();
        let s = HostStorage::new([("ms0:/", tmp.path().to_path_buf()), ("ef0:/", tmp.path().join("nope"))]);
        assert_eq!(s.devices(), ["ef0:/", "ms0:/"]);
        assert!(s.is_present("ms0:/"));
        assert!(!s.is_present("ef0:/"));
    }

    #[cfg(unix)]
    #[test]
    fn free_bytes_reports_something() {
        let tmp = tempfile::tempdir().unwrap();
        let s = storage(&tmp);
        assert!(s.free_bytes("ms0:/").unwrap() > 0);
    }
}
