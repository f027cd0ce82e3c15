//! Startup recovery (§4.13): load the most recent snapshot, then replay
//! whatever WAL tail sits after it. Runs once, before the durability
//! coordinator or store is exposed to any command.

use crate::commands::{
    CreateLibraryPayload, DeleteChunkPayload, DeleteLibraryPayload, InsertChunkPayload,
    InsertChunksBulkPayload, UpdateChunkMetadataPayload, UpdateLibraryPayload,
};
use crate::library_store::{LibraryStore, StoreSnapshot};
use std::path::Path;
use vstore_core::{OpKind, VdbError, VdbResult};
use vstore_durability::{Snapshotter, Wal};

/// Applies one decoded WAL record to `store` by dispatching on its
/// `op_kind` — the same dispatch the live command router drives through
/// `library_store::apply_*`, so replay and live operation stay provably
/// equivalent.
fn apply_record(store: &LibraryStore, op_kind: OpKind, payload: &[u8]) -> VdbResult<()> {
    match op_kind {
        OpKind::CreateLibrary => {
            let p: CreateLibraryPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_create_library(p)
        }
        OpKind::UpdateLibrary => {
            let p: UpdateLibraryPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_update_library(p)
        }
        OpKind::DeleteLibrary => {
            let p: DeleteLibraryPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_delete_library(p)
        }
        OpKind::InsertChunk => {
            let p: InsertChunkPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_insert_chunk(p)
        }
        OpKind::InsertChunksBulk => {
            let p: InsertChunksBulkPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_insert_chunks_bulk(p)
        }
        OpKind::UpdateChunkMetadata => {
            let p: UpdateChunkMetadataPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_update_chunk_metadata(p)
        }
        OpKind::DeleteChunk => {
            let p: DeleteChunkPayload = rmp_serde::from_slice(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
            store.apply_delete_chunk(p)
        }
    }
}

/// Result of a recovery pass: the populated store and the next sequence
/// number the WAL should allocate (one past the highest record applied,
/// whether it came from the snapshot or the replayed tail).
pub struct RecoveredState {
    pub store: LibraryStore,
    pub next_seq: u64,
}

/// Loads the current snapshot (if any) and replays the WAL tail after it.
/// An instance with no snapshot and no WAL segments recovers to an empty
/// store starting at sequence 1.
pub fn recover(wal_dir: impl AsRef<Path>, snapshot_dir: impl AsRef<Path>) -> VdbResult<RecoveredState> {
    let snapshotter = Snapshotter::new(snapshot_dir)?;
    let store = LibraryStore::new();

    let from_seq = match snapshotter.current_seq()? {
        Some(seq) => {
            let body: StoreSnapshot = snapshotter.load(seq)?;
            store.load_snapshot(body)?;
            tracing::info!(seq, "loaded snapshot");
            seq + 1
        }
        None => 1,
    };

    let last_applied = Wal::replay(wal_dir, from_seq, |record| {
        apply_record(&store, record.op_kind, &record.payload)
    })?;

    let next_seq = last_applied + 1;
    tracing::info!(next_seq, "recovery complete");
    Ok(RecoveredState { store, next_seq })
}
