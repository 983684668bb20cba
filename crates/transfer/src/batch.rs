//! Batch execution: preflight, per-item loop, cache patching.

use std::collections::BTreeSet;

use kfe_cache::DeviceCache;
use kfe_catalog::{ItemKind, build_dest_path, device_of};
use kfe_free_space::FreeSpaceView;
use serde::{Deserialize, Serialize};

use crate::engine::TransferEngine;
use crate::progress::Progress;
use crate::{PreflightError, SPACE_HEADROOM};

/// User-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Move,
    Copy,
    Delete,
}

impl Operation {
    /// Verb used in the result message.
    pub fn past_tense(self) -> &'static str {
        match self {
            Operation::Move => "Moved",
            Operation::Copy => "Copied",
            Operation::Delete => "Deleted",
        }
    }

    /// Whether the operation needs a destination device and category.
    pub fn needs_destination(self) -> bool {
        !matches!(self, Operation::Delete)
    }
}

/// One selected item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub path: String,
    pub kind: ItemKind,
}

impl SourceItem {
    pub fn new(path: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub op: Operation,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchOutcome {
    fn new(op: Operation) -> Self {
        Self {
            op,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Short message for the user: `Moved 3`, `Moved 3, failed 1`.
    pub fn summary(&self) -> String {
        match (self.succeeded, self.failed) {
            (0, 0) => "Nothing to do".to_string(),
            (ok, 0) => format!("{} {ok}", self.op.past_tense()),
            (ok, failed) => format!("{} {ok}, failed {failed}", self.op.past_tense()),
        }
    }
}

/// A failed item may have changed the disk part way; the devices it
/// touched are rescanned on next access instead of patched.
fn mark_touched_dirty(cache: &mut DeviceCache, paths: &[&str]) {
    let devices: BTreeSet<&str> = paths.iter().filter_map(|p| device_of(p)).collect();
    for device in devices {
        cache.mark_dirty(device);
    }
}

impl TransferEngine {
    /// Bytes `op` would need on `dest_device` for `sources`.
    ///
    /// Same-device moves need nothing.
    fn bytes_needed(&self, op: Operation, sources: &[SourceItem], dest_device: &str) -> u64 {
        sources
            .iter()
            .filter(|src| {
                op == Operation::Copy
                    || !device_of(&src.path).is_some_and(|d| d.eq_ignore_ascii_case(dest_device))
            })
            .map(|src| self.required_bytes(&src.path))
            .sum()
    }

    /// Refuses the batch when the cached free space of `dest_device` is
    /// known and too small. An unknown reading lets the batch proceed.
    pub fn preflight(
        &self,
        op: Operation,
        space: &dyn FreeSpaceView,
        sources: &[SourceItem],
        dest_device: &str,
    ) -> Result<(), PreflightError> {
        let required = self.bytes_needed(op, sources, dest_device);
        if required == 0 {
            return Ok(());
        }
        let reading = space.reading(dest_device);
        if !reading.ok {
            tracing::debug!(device = dest_device, required, "free space unknown, skipping preflight");
            return Ok(());
        }
        if reading.bytes < required.saturating_add(SPACE_HEADROOM) {
            tracing::warn!(
                device = dest_device,
                required,
                available = reading.bytes,
                "batch refused: insufficient free space"
            );
            return Err(PreflightError::InsufficientSpace {
                device: dest_device.to_string(),
                required,
                available: reading.bytes,
            });
        }
        Ok(())
    }

    pub fn perform_move(
        &self,
        cache: &mut DeviceCache,
        space: &dyn FreeSpaceView,
        sources: &[SourceItem],
        dest_device: &str,
        dest_category: &str,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<BatchOutcome, PreflightError> {
        self.perform_transfer(Operation::Move, cache, space, sources, dest_device, dest_category, progress)
    }

    pub fn perform_copy(
        &self,
        cache: &mut DeviceCache,
        space: &dyn FreeSpaceView,
        sources: &[SourceItem],
        dest_device: &str,
        dest_category: &str,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<BatchOutcome, PreflightError> {
        self.perform_transfer(Operation::Copy, cache, space, sources, dest_device, dest_category, progress)
    }

    #[allow(clippy::too_many_arguments)]
    fn perform_transfer(
        &self,
        op: Operation,
        cache: &mut DeviceCache,
        space: &dyn FreeSpaceView,
        sources: &[SourceItem],
        dest_device: &str,
        dest_category: &str,
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> Result<BatchOutcome, PreflightError> {
        self.preflight(op, space, sources, dest_device)?;

        let mut outcome = BatchOutcome::new(op);
        for src in sources {
            let dst = build_dest_path(&src.path, src.kind, dest_device, dest_category);
            let result = match op {
                Operation::Move => self
                    .move_one(&src.path, &dst, src.kind, progress)
                    .map(|strategy| tracing::debug!(src = %src.path, dst = %dst, ?strategy, "moved")),
                _ => self.copy_one(&src.path, &dst, src.kind, progress),
            };
            match result {
                Ok(()) => {
                    outcome.succeeded += 1;
                    if !src.path.eq_ignore_ascii_case(&dst) {
                        cache.apply_move_or_copy(&src.path, &dst, src.kind, op == Operation::Move);
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(src = %src.path, dst = %dst, error = %e, "transfer failed");
                    if !e.is_refusal() {
                        mark_touched_dirty(cache, &[&src.path, &dst]);
                    }
                }
            }
        }

        space.request_refresh();
        tracing::info!(
            op = ?op,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "batch finished"
        );
        Ok(outcome)
    }

    /// Deletes every source; failures are counted, not fatal.
    pub fn perform_delete(
        &self,
        cache: &mut DeviceCache,
        space: &dyn FreeSpaceView,
        sources: &[SourceItem],
        progress: &mut dyn FnMut(Progress<'_>),
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::new(Operation::Delete);
        let mut devices = BTreeSet::new();
        for src in sources {
            match self.delete_one(&src.path, src.kind, progress) {
                Ok(()) => {
                    outcome.succeeded += 1;
                    cache.erase_path(&src.path);
                    if let Some(device) = device_of(&src.path) {
                        devices.insert(device.to_string());
                    }
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(path = %src.path, error = %e, "delete failed");
                    if !e.is_refusal() {
                        mark_touched_dirty(cache, &[&src.path]);
                    }
                }
            }
        }
        if !devices.is_empty() {
            space.request_refresh();
        }
        tracing::info!(
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "delete batch finished"
        );
        outcome
    }
}
