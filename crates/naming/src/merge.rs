use std::io;

use kfe_catalog::join;
use kfe_storage::{Storage, remove_tree};

/// Moves everything in `src` into `dst`, then removes `src`.
///
/// On a name clash the destination's file is kept and the source's copy is
/// discarded; clashing directories are merged recursively. Individual
/// failures are logged and skipped. The result reflects whether `src`
/// could be removed at the end.
pub fn merge_dirs(storage: &dyn Storage, src: &str, dst: &str) -> io::Result<()> {
    for entry in storage.read_dir(src)? {
        let from = join(src, &entry.name);
        let to = join(dst, &entry.name);
        let outcome = match (entry.is_dir, storage.metadata(&to)) {
            (true, Ok(meta)) if meta.is_dir => merge_dirs(storage, &from, &to),
            (_, Ok(_)) => remove_tree(storage, &from),
            (_, Err(_)) => storage.rename(&from, &to),
        };
        if let Err(e) = outcome {
            tracing::warn!(from = %from, to = %to, error = %e, "merge entry failed");
        }
        std::thread::yield_now();
    }
    storage.remove_dir(src).inspect_err(|e| {
        tracing::warn!(dir = %src, error = %e, "merged folder could not be removed");
    })
}
