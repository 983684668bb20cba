//! Transfer engine: move, copy and delete of catalog items.
//!
//! Single-item primitives pick the cheapest strategy that works on the
//! device (devctl move, rename, per-entry rename, copy then delete). Batch
//! operations add a free-space preflight and keep going past individual
//! failures. Each success patches the snapshot cache; a failure that got
//! as far as the disk marks the devices involved dirty.

mod batch;
mod engine;
mod progress;

use kfe_catalog::ItemKind;

pub use batch::{BatchOutcome, Operation, SourceItem};
pub use engine::{MoveStrategy, TransferEngine};
pub use progress::Progress;

/// Smallest copy buffer.
pub const MIN_BUFFER_SIZE: usize = 64 * 1024;

/// Largest copy buffer.
pub const MAX_BUFFER_SIZE: usize = 512 * 1024;

/// Default copy buffer: 256 KiB.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Free space kept in reserve when checking a batch: 4 MiB.
pub const SPACE_HEADROOM: u64 = 4 * 1024 * 1024;

/// Errors of a single-item operation.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source not found: {0}")]
    SourceMissing(String),

    #[error("cannot place {src} inside itself ({dst})")]
    IntoItself { src: String, dst: String },

    #[error("cannot replace {dst}: it holds {src}")]
    OntoParent { src: String, dst: String },

    #[error("{dst} is in the way and is not a {kind:?} item")]
    DestinationOccupied { dst: String, kind: ItemKind },
}

impl TransferError {
    /// Whether the operation was refused before anything on disk changed.
    pub fn is_refusal(&self) -> bool {
        !matches!(self, TransferError::Io(_))
    }
}

/// Reason a batch was refused before touching any file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreflightError {
    #[error("Not enough free space on {device}: {required} bytes needed, {available} available")]
    InsufficientSpace {
        device: String,
        required: u64,
        available: u64,
    },
}
