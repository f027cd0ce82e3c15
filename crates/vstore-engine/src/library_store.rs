//! In-memory library/chunk storage (§4.8). A `LibraryStore` owns a
//! `library-id -> Library` map and a secondary `name -> library-id` map
//! for uniqueness; each `LibraryRecord` owns its own chunk table and
//! index, mirroring the ownership rules in §3 ("each library exclusively
//! owns its vectors and its index"; the index never owns chunks, only
//! ids).
//!
//! Every method here is a pure in-memory mutation with no locking and no
//! WAL interaction of its own — callers (the command router in `db.rs`
//! for the live path, `recovery.rs` for replay) are responsible for
//! holding the right locks from `vstore_lock::LockManager` and for
//! writing the WAL record first. Applying the same typed payload through
//! the same `apply_*` method on both paths is what keeps live operation
//! and crash replay provably equivalent (§8 invariant 2).

use crate::commands::{
    CreateLibraryPayload, DeleteChunkPayload, DeleteLibraryPayload, InsertChunkPayload,
    InsertChunksBulkPayload, UpdateChunkMetadataPayload, UpdateLibraryPayload,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vstore_core::{Chunk, ChunkId, Library, LibraryId, VdbError, VdbResult};
use vstore_index::IndexHandle;

/// Per-library state: metadata, the chunk table (source of truth for text
/// and metadata, per §3), the index (holding only ids), and the bijection
/// between externally-visible `ChunkId`s and the `u64` ids the index
/// trait (`VectorIndex`) operates on.
pub struct LibraryRecord {
    pub meta: RwLock<Library>,
    pub chunks: DashMap<ChunkId, Chunk>,
    pub index: RwLock<IndexHandle>,
    next_internal_id: AtomicU64,
    chunk_to_internal: DashMap<ChunkId, u64>,
    internal_to_chunk: DashMap<u64, ChunkId>,
}

impl LibraryRecord {
    fn new(library: Library) -> Self {
        let index = IndexHandle::new(library.dim, library.metric, library.index_params.clone());
        Self {
            meta: RwLock::new(library),
            chunks: DashMap::new(),
            index: RwLock::new(index),
            next_internal_id: AtomicU64::new(0),
            chunk_to_internal: DashMap::new(),
            internal_to_chunk: DashMap::new(),
        }
    }

    fn alloc_internal_id(&self, chunk_id: ChunkId) -> u64 {
        let internal = self.next_internal_id.fetch_add(1, Ordering::SeqCst);
        self.chunk_to_internal.insert(chunk_id, internal);
        self.internal_to_chunk.insert(internal, chunk_id);
        internal
    }

    fn forget_internal_id(&self, chunk_id: ChunkId) {
        if let Some((_, internal)) = self.chunk_to_internal.remove(&chunk_id) {
            self.internal_to_chunk.remove(&internal);
        }
    }

    pub fn internal_id_of(&self, chunk_id: ChunkId) -> Option<u64> {
        self.chunk_to_internal.get(&chunk_id).map(|v| *v)
    }

    pub fn chunk_id_of(&self, internal: u64) -> Option<ChunkId> {
        self.internal_to_chunk.get(&internal).map(|v| *v)
    }

    /// Rebuilds the index in place from the current chunk table, used by
    /// on-demand or tombstone-triggered rebuild (§4.10) and by recovery
    /// (snapshots don't carry index internals, only chunks — rebuilding
    /// deterministically from the embeddings is simpler and is exactly
    /// what §8 invariant 7 already requires rebuild to satisfy).
    pub fn rebuild_index(&self) -> VdbResult<()> {
        let vectors: Vec<(u64, Vec<f64>)> = self
            .chunks
            .iter()
            .filter_map(|entry| {
                self.internal_id_of(*entry.key())
                    .map(|internal| (internal, entry.value().embedding.as_slice().to_vec()))
            })
            .collect();
        let meta = self.meta.read();
        let mut fresh = IndexHandle::new(meta.dim, meta.metric, meta.index_params.clone());
        drop(meta);
        fresh.build(&vectors)?;
        *self.index.write() = fresh;
        Ok(())
    }
}

/// A full in-memory dump of one library, the unit the snapshotter writes
/// (§4.12, §6): the library's metadata plus every live chunk. The index
/// is intentionally excluded — it is rebuilt from these chunks on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub library: Library,
    pub chunks: Vec<Chunk>,
}

/// The whole store's durable state: every library's snapshot (§6 "a dump
/// of all library and chunk state").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub libraries: Vec<LibrarySnapshot>,
}

#[derive(Default)]
pub struct LibraryStore {
    libraries: DashMap<LibraryId, Arc<LibraryRecord>>,
    name_index: DashMap<String, LibraryId>,
}

impl LibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.name_index.contains_key(name)
    }

    pub fn get(&self, id: LibraryId) -> Option<Arc<LibraryRecord>> {
        self.libraries.get(&id).map(|e| e.value().clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<LibraryRecord>> {
        let id = *self.name_index.get(name)?;
        self.get(id)
    }

    /// Snapshot of every library, ordered by creation time then id — the
    /// stable order pagination cursors are defined against.
    pub fn list_ordered(&self) -> Vec<Arc<LibraryRecord>> {
        let mut all: Vec<Arc<LibraryRecord>> = self.libraries.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|rec| {
            let meta = rec.meta.read();
            (meta.created_at_nanos, meta.id)
        });
        all
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    // -- apply_* mutators: the only place that actually touches the maps,
    // shared by the live command path and WAL replay. --

    pub fn apply_create_library(&self, p: CreateLibraryPayload) -> VdbResult<()> {
        if self.name_index.contains_key(&p.name) {
            return Err(VdbError::AlreadyExists(format!("library name {:?}", p.name)));
        }
        let library = Library {
            id: p.id,
            name: p.name.clone(),
            description: p.description,
            dim: p.dim,
            metric: p.metric,
            index_params: p.index_params,
            metadata: p.metadata,
            created_at_nanos: p.created_at_nanos,
            updated_at_nanos: p.created_at_nanos,
        };
        self.name_index.insert(p.name, p.id);
        self.libraries.insert(p.id, Arc::new(LibraryRecord::new(library)));
        Ok(())
    }

    pub fn apply_update_library(&self, p: UpdateLibraryPayload) -> VdbResult<()> {
        let record = self
            .get(p.id)
            .ok_or_else(|| VdbError::NotFound(format!("library {}", p.id)))?;
        let mut meta = record.meta.write();
        if let Some(new_name) = &p.patch.name {
            if new_name != &meta.name {
                if self.name_index.contains_key(new_name) {
                    return Err(VdbError::AlreadyExists(format!("library name {new_name:?}")));
                }
                self.name_index.remove(&meta.name);
                self.name_index.insert(new_name.clone(), p.id);
                meta.name = new_name.clone();
            }
        }
        if let Some(description) = p.patch.description {
            meta.description = description;
        }
        if let Some(metadata) = p.patch.metadata {
            meta.metadata = metadata;
        }
        meta.updated_at_nanos = p.updated_at_nanos;
        Ok(())
    }

    pub fn apply_delete_library(&self, p: DeleteLibraryPayload) -> VdbResult<()> {
        if let Some((_, record)) = self.libraries.remove(&p.id) {
            let name = record.meta.read().name.clone();
            self.name_index.remove(&name);
        }
        Ok(())
    }

    pub fn apply_insert_chunk(&self, p: InsertChunkPayload) -> VdbResult<()> {
        let record = self
            .get(p.library_id)
            .ok_or_else(|| VdbError::NotFound(format!("library {}", p.library_id)))?;
        insert_one(&record, p.chunk)
    }

    pub fn apply_insert_chunks_bulk(&self, p: InsertChunksBulkPayload) -> VdbResult<()> {
        let record = self
            .get(p.library_id)
            .ok_or_else(|| VdbError::NotFound(format!("library {}", p.library_id)))?;
        for chunk in p.chunks {
            insert_one(&record, chunk)?;
        }
        Ok(())
    }

    pub fn apply_update_chunk_metadata(&self, p: UpdateChunkMetadataPayload) -> VdbResult<()> {
        let record = self
            .get(p.library_id)
            .ok_or_else(|| VdbError::NotFound(format!("library {}", p.library_id)))?;
        let mut chunk = record
            .chunks
            .get_mut(&p.chunk_id)
            .ok_or_else(|| VdbError::NotFound(format!("chunk {}", p.chunk_id)))?;
        for (k, v) in p.patch {
            chunk.metadata.insert(k, v);
        }
        chunk.updated_at_nanos = p.updated_at_nanos;
        Ok(())
    }

    pub fn apply_delete_chunk(&self, p: DeleteChunkPayload) -> VdbResult<()> {
        let record = self
            .get(p.library_id)
            .ok_or_else(|| VdbError::NotFound(format!("library {}", p.library_id)))?;
        if record.chunks.remove(&p.chunk_id).is_some() {
            if let Some(internal) = record.internal_id_of(p.chunk_id) {
                record.index.write().remove(internal);
            }
            record.forget_internal_id(p.chunk_id);
        }
        Ok(())
    }

    /// Loads from a snapshot body, replacing all current state. Used only
    /// during recovery before any WAL replay.
    pub fn load_snapshot(&self, snapshot: StoreSnapshot) -> VdbResult<()> {
        self.libraries.clear();
        self.name_index.clear();
        for lib_snap in snapshot.libraries {
            let id = lib_snap.library.id;
            let name = lib_snap.library.name.clone();
            let record = LibraryRecord::new(lib_snap.library);
            for chunk in lib_snap.chunks {
                let chunk_id = chunk.id;
                record.alloc_internal_id(chunk_id);
                record.chunks.insert(chunk_id, chunk);
            }
            record.rebuild_index()?;
            self.name_index.insert(name, id);
            self.libraries.insert(id, Arc::new(record));
        }
        Ok(())
    }

    /// Dumps the current state into a `StoreSnapshot` body, the unit the
    /// snapshotter (§4.12) serializes to disk.
    pub fn to_snapshot(&self) -> StoreSnapshot {
        let libraries = self
            .list_ordered()
            .into_iter()
            .map(|record| LibrarySnapshot {
                library: record.meta.read().clone(),
                chunks: record.chunks.iter().map(|e| e.value().clone()).collect(),
            })
            .collect();
        StoreSnapshot { libraries }
    }
}

fn insert_one(record: &LibraryRecord, chunk: Chunk) -> VdbResult<()> {
    if record.chunks.contains_key(&chunk.id) {
        return Err(VdbError::AlreadyExists(format!("chunk {}", chunk.id)));
    }
    let dim = record.meta.read().dim;
    chunk.embedding.require_dim(dim)?;
    let chunk_id = chunk.id;
    let internal = record.alloc_internal_id(chunk_id);
    record.index.write().insert(internal, chunk.embedding.as_slice())?;
    record.chunks.insert(chunk_id, chunk);
    Ok(())
}
