//! Index rebuild (§4.10): construct a fresh index from a library's live
//! vectors and atomically swap it in. Readers observe either the old or
//! new index, never a partial one, because the swap happens under a
//! single `INDEX` write-lock hold and `LibraryRecord::rebuild_index`
//! builds the replacement into a local variable first.

use crate::library_store::LibraryStore;
use std::time::Instant;
use vstore_core::{LibraryId, RuntimeStats, VdbError, VdbResult};
use vstore_lock::{LockManager, ResourceKind};

/// Rebuilds the index of one library on demand (the `rebuild_index`
/// command, §6) or because a tombstone-ratio trigger fired (§4.6/§4.7).
/// Acquires LIBRARY read + INDEX write, exactly as §4.10 specifies.
pub fn rebuild_library(
    store: &LibraryStore,
    locks: &LockManager,
    library_id: LibraryId,
    deadline: Instant,
) -> VdbResult<()> {
    let mut session = locks.session();
    session.read(ResourceKind::Library, library_id.0, deadline)?;
    session.write(ResourceKind::Index, library_id.0, deadline)?;

    let record = store
        .get(library_id)
        .ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;
    tracing::info!(%library_id, "index rebuild starting");
    let result = record.rebuild_index();
    match &result {
        Ok(()) => tracing::info!(%library_id, "index rebuild finished and swapped in"),
        Err(err) => tracing::warn!(%library_id, %err, "index rebuild failed"),
    }
    result
}

/// Scans every library and rebuilds any whose index has crossed the 30%
/// tombstone threshold (§4.6, §4.7). Intended to be driven periodically
/// by a background worker (`RebuildWorker`), not called per-request.
pub fn rebuild_stale_indexes(
    store: &LibraryStore,
    locks: &LockManager,
    stats: &RuntimeStats,
    deadline_per_rebuild: std::time::Duration,
) {
    for record in store.list_ordered() {
        let ratio = record.index.read().tombstone_ratio();
        if ratio > 0.3 {
            let library_id = record.meta.read().id;
            tracing::info!(%library_id, ratio, "tombstone ratio exceeded 30%; triggering background rebuild");
            let deadline = Instant::now() + deadline_per_rebuild;
            if rebuild_library(store, locks, library_id, deadline).is_ok() {
                stats.record_rebuild();
            }
        }
    }
}
