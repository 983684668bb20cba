use std::io::{self, Read, Write};
use std::sync::Arc;

use kfe_catalog::{ItemKind, eq_ignore_case, is_app_marker, join, parent_of};
use kfe_storage::{Storage, path_size, remove_tree};
use serde::Serialize;

use crate::progress::{Meter, Progress};
use crate::{DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE, TransferError};

/// How a move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveStrategy {
    /// Source and destination were the same path.
    Noop,
    DevctlMove,
    Rename,
    /// Folder moved child by child.
    PerEntryRename,
    CopyDelete,
}

/// Single-item file operations over a [`Storage`].
#[derive(Clone)]
pub struct TransferEngine {
    storage: Arc<dyn Storage>,
    buffer_size: usize,
}

fn label_of(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn is_inside(path: &str, dir: &str) -> bool {
    let dir = dir.trim_end_matches('/');
    path.len() > dir.len()
        && path.as_bytes()[dir.len()] == b'/'
        && eq_ignore_case(&path[..dir.len()], dir)
}

impl TransferEngine {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Sets the copy buffer size, clamped to 64..=512 KiB.
    pub fn with_buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes.clamp(MIN_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Bytes a copy of `path` would write.
    pub fn required_bytes(&self, path: &str) -> u64 {
        path_size(self.storage.as_ref(), path)
    }

    /// Checks the source and clears the way for `dst`.
    ///
    /// An existing destination of the same kind is deleted: last write
    /// wins. Every refusal happens before the disk is touched.
    fn prepare_destination(&self, src: &str, dst: &str, kind: ItemKind) -> Result<(), TransferError> {
        if !self.storage.exists(src) {
            return Err(TransferError::SourceMissing(src.to_string()));
        }
        if is_inside(dst, src) {
            return Err(TransferError::IntoItself {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        if is_inside(src, dst) {
            return Err(TransferError::OntoParent {
                src: src.to_string(),
                dst: dst.to_string(),
            });
        }
        let replace = self.storage.exists(dst);
        if replace && !self.is_replaceable(dst, kind) {
            return Err(TransferError::DestinationOccupied {
                dst: dst.to_string(),
                kind,
            });
        }
        if let Some(parent) = parent_of(dst) {
            self.storage.create_dir_all(parent)?;
        }
        if replace {
            tracing::debug!(dst = %dst, "replacing existing destination");
            remove_tree(self.storage.as_ref(), dst)?;
        }
        Ok(())
    }

    /// Whether `dst` holds an item of `kind` that may be overwritten.
    ///
    /// Category folders and anything of another kind never are.
    fn is_replaceable(&self, dst: &str, kind: ItemKind) -> bool {
        let is_dir = self.storage.is_dir(dst);
        if !kind.is_folder() {
            return !is_dir;
        }
        is_dir
            && self
                .storage
                .read_dir(dst)
                .is_ok_and(|entries| entries.iter().any(|e| !e.is_dir && is_app_marker(&e.name)))
    }

    /// Copies `src` to `dst`, removing a partial folder on failure.
    ///
    /// A `dst` that existed before the copy is kept: it holds entries a
    /// per-entry move already took out of `src`.
    fn copy_clean(&self, src: &str, dst: &str, kind: ItemKind, meter: &mut Meter<'_>) -> io::Result<()> {
        let fresh = !self.storage.exists(dst);
        let result = self.copy_any(src, dst, meter);
        if result.is_err() && kind.is_folder() && fresh && self.storage.exists(dst) {
            if let Err(e) = remove_tree(self.storage.as_ref(), dst) {
                tracing::debug!(dst = %dst, error = %e, "could not clean up partial copy");
            }
        }
        result
    }

    /// Moves one item, trying cheaper strategies first.
    pub fn move_one(
        &self,
        src: &str,
        dst: &str,
        kind: ItemKind,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<MoveStrategy, TransferError> {
        if eq_ignore_case(src, dst) {
            return Ok(MoveStrategy::Noop);
        }
        self.prepare_destination(src, dst, kind)?;
        let storage = self.storage.as_ref();

        if storage.same_physical_device(src, dst) {
            match storage.devctl_move(src, dst) {
                Ok(()) => return Ok(MoveStrategy::DevctlMove),
                Err(e) => tracing::debug!(src = %src, error = %e, "devctl move failed, trying rename"),
            }
            match storage.rename(src, dst) {
                Ok(()) => return Ok(MoveStrategy::Rename),
                Err(e) => tracing::warn!(src = %src, dst = %dst, error = %e, "rename failed"),
            }
            if kind.is_folder() {
                match self.move_entries(src, dst) {
                    Ok(()) => return Ok(MoveStrategy::PerEntryRename),
                    Err(e) => {
                        tracing::warn!(src = %src, error = %e, "per-entry move failed, copying")
                    }
                }
            }
        }

        let total = self.required_bytes(src);
        let mut meter = Meter::new(label_of(src), total, progress);
        meter.start();
        self.copy_clean(src, dst, kind, &mut meter)?;
        remove_tree(storage, src)?;
        Ok(MoveStrategy::CopyDelete)
    }

    /// Copies one item; the source is never modified.
    pub fn copy_one(
        &self,
        src: &str,
        dst: &str,
        kind: ItemKind,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<(), TransferError> {
        if eq_ignore_case(src, dst) {
            return Ok(());
        }
        self.prepare_destination(src, dst, kind)?;
        let total = self.required_bytes(src);
        let mut meter = Meter::new(label_of(src), total, progress);
        meter.start();
        self.copy_clean(src, dst, kind, &mut meter)?;
        Ok(())
    }

    /// Deletes one item; folders are emptied depth first.
    pub fn delete_one(
        &self,
        path: &str,
        kind: ItemKind,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<(), TransferError> {
        let meta = self
            .storage
            .metadata(path)
            .map_err(|_| TransferError::SourceMissing(path.to_string()))?;
        if !meta.is_dir {
            let mut meter = Meter::new(label_of(path), 1, progress);
            self.storage.remove_file(path)?;
            meter.advance(1);
            return Ok(());
        }
        if !kind.is_folder() {
            tracing::debug!(path = %path, "deleting directory for a file item");
        }
        let total = self.count_entries(path);
        let mut meter = Meter::new(label_of(path), total, progress);
        meter.start();
        self.delete_tree(path, &mut meter)?;
        Ok(())
    }

    fn copy_any(&self, src: &str, dst: &str, meter: &mut Meter<'_>) -> io::Result<()> {
        if self.storage.is_dir(src) {
            self.copy_tree(src, dst, meter)
        } else {
            self.copy_file(src, dst, meter)
        }
    }

    fn copy_tree(&self, src: &str, dst: &str, meter: &mut Meter<'_>) -> io::Result<()> {
        self.storage.create_dir_all(dst)?;
        for entry in self.storage.read_dir(src)? {
            let from = join(src, &entry.name);
            let to = join(dst, &entry.name);
            if entry.is_dir {
                self.copy_tree(&from, &to, meter)?;
            } else {
                self.copy_file(&from, &to, meter)?;
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Streams one file; a partial destination is removed on failure.
    fn copy_file(&self, src: &str, dst: &str, meter: &mut Meter<'_>) -> io::Result<()> {
        let result = self.stream_file(src, dst, meter);
        if let Err(e) = &result {
            tracing::warn!(src = %src, dst = %dst, error = %e, "file copy failed");
            if self.storage.exists(dst) {
                if let Err(e) = self.storage.remove_file(dst) {
                    tracing::debug!(dst = %dst, error = %e, "could not remove partial file");
                }
            }
        }
        result
    }

    fn stream_file(&self, src: &str, dst: &str, meter: &mut Meter<'_>) -> io::Result<()> {
        let mut reader = self.storage.open_read(src)?;
        let mut writer = self.storage.open_write(dst)?;
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            writer.write_all(&buf[..n])?;
            meter.advance(n as u64);
        }
        writer.flush()
    }

    /// Moves a folder child by child.
    ///
    /// Subfolders are recreated and recursed into; a file whose rename
    /// fails is copied and deleted instead. The emptied source is removed.
    fn move_entries(&self, src: &str, dst: &str) -> io::Result<()> {
        let storage = self.storage.as_ref();
        storage.create_dir_all(dst)?;
        for entry in storage.read_dir(src)? {
            let from = join(src, &entry.name);
            let to = join(dst, &entry.name);
            if entry.is_dir {
                self.move_entries(&from, &to)?;
            } else if let Err(e) = storage.rename(&from, &to) {
                tracing::debug!(from = %from, error = %e, "entry rename failed, copying");
                let mut ignore = |_: Progress<'_>| {};
                let mut meter = Meter::new(&entry.name, 0, &mut ignore);
                self.copy_file(&from, &to, &mut meter)?;
                storage.remove_file(&from)?;
            }
            std::thread::yield_now();
        }
        storage.remove_dir(src)
    }

    fn count_entries(&self, dir: &str) -> u64 {
        let Ok(entries) = self.storage.read_dir(dir) else {
            return 0;
        };
        entries
            .iter()
            .map(|entry| {
                if entry.is_dir {
                    1 + self.count_entries(&join(dir, &entry.name))
                } else {
                    1
                }
            })
            .sum()
    }

    fn delete_tree(&self, dir: &str, meter: &mut Meter<'_>) -> io::Result<()> {
        for entry in self.storage.read_dir(dir)? {
            let child = join(dir, &entry.name);
            if entry.is_dir {
                self.delete_tree(&child, meter)?;
            } else {
                self.storage.remove_file(&child)?;
            }
            meter.advance(1);
            std::thread::yield_now();
        }
        self.storage.remove_dir(dir)
    }
}
