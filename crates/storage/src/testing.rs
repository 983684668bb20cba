//! Fault injection for tests.
//!
//! [`FaultyStorage`] wraps another [`Storage`], records every mutating call
//! and fails chosen operations on chosen paths with `PermissionDenied`.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{DirEntry, EntryMeta, Storage};

/// Operation kinds that can be failed or observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ReadDir,
    Metadata,
    CreateDir,
    RemoveFile,
    RemoveDir,
    Rename,
    DevctlMove,
    OpenRead,
    OpenWrite,
}

#[derive(Debug, Default)]
struct Faults {
    rules: Vec<(Op, String)>,
    calls: Vec<(Op, String)>,
}

/// A [`Storage`] decorator with scripted failures.
pub struct FaultyStorage {
    inner: Arc<dyn Storage>,
    state: Mutex<Faults>,
}

fn lock(state: &Mutex<Faults>) -> MutexGuard<'_, Faults> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FaultyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            state: Mutex::new(Faults::default()),
        }
    }

    /// Fails `op` on `path` and on everything below it.
    pub fn fail(&self, op: Op, path: impl Into<String>) {
        lock(&self.state).rules.push((op, path.into()));
    }

    /// Removes every rule.
    pub fn heal(&self) {
        lock(&self.state).rules.clear();
    }

    /// Paths `op` was called with, in order.
    pub fn calls(&self, op: Op) -> Vec<String> {
        lock(&self.state)
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn check(&self, op: Op, path: &str) -> io::Result<()> {
        let mut state = lock(&self.state);
        state.calls.push((op, path.to_string()));
        let hit = state.rules.iter().any(|(o, p)| {
            *o == op && (path == p || path.starts_with(&format!("{}/", p.trim_end_matches('/'))))
        });
        if hit {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected {op:?} failure: {path}"),
            ))
        } else {
            Ok(())
        }
    }
}

impl Storage for FaultyStorage {
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        self.check(Op::ReadDir, path)?;
        self.inner.read_dir(path)
    }

    fn metadata(&self, path: &str) -> io::Result<EntryMeta> {
        self.check(Op::Metadata, path)?;
        self.inner.metadata(path)
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        self.check(Op::CreateDir, path)?;
        self.inner.create_dir(path)
    }

    fn create_dir_all(&self, path: &str) -> io::Result<()> {
        self.check(Op::CreateDir, path)?;
        self.inner.create_dir_all(path)
    }

    fn remove_file(&self, path: &str) -> io::Result<()> {
        self.check(Op::RemoveFile, path)?;
        self.inner.remove_file(path)
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        self.check(Op::RemoveDir, path)?;
        self.inner.remove_dir(path)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        self.check(Op::Rename, from)?;
        self.inner.rename(from, to)
    }

    fn devctl_move(&self, from: &str, to: &str) -> io::Result<()> {
        self.check(Op::DevctlMove, from)?;
        self.inner.devctl_move(from, to)
    }

    fn open_read(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        self.check(Op::OpenRead, path)?;
        self.inner.open_read(path)
    }

    fn open_write(&self, path: &str) -> io::Result<Box<dyn Write + Send>> {
        self.check(Op::OpenWrite, path)?;
        self.inner.open_write(path)
    }

    fn same_physical_device(&self, a: &str, b: &str) -> bool {
        self.inner.same_physical_device(a, b)
    }
}
