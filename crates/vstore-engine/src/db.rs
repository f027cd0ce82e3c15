//! `VectorDb`: the public command surface (§6). Owns the in-memory store,
//! the lock manager, and the durability coordinator, and is the only
//! place that stitches "append to the WAL" and "mutate memory" together
//! for a live request — `library_store::apply_*` stays pure so the same
//! logic drives replay.
//!
//! Lock-hierarchy discipline follows §4.8/§5: library-level administrative
//! operations (create/update/delete library) hold `STORE` write across
//! their WAL append, which is an explicitly accepted simplification for
//! what are rare, non-hot-path operations (see the design ledger).
//! Chunk-level operations hold `STORE` read for the same span — not to
//! serialize against each other (`LIBRARY`/`INDEX` already do that), but
//! so that `snapshot_now`'s `STORE` write excludes every in-flight chunk
//! mutation. Without this, a chunk insert could land in memory between
//! the snapshot reading the next WAL sequence and dumping the chunk
//! table, producing a snapshot body stamped with a sequence older than
//! the chunk it already contains — on recovery the WAL replay of that
//! chunk's insert would then see it as already present and fail.

use crate::commands::{
    CreateLibraryPayload, DeleteChunkPayload, DeleteLibraryPayload, InsertChunkPayload,
    InsertChunksBulkPayload, LibraryPatch, UpdateChunkMetadataPayload, UpdateLibraryPayload,
};
use crate::coordinator::DurabilityCoordinator;
use crate::library_store::LibraryStore;
use crate::pagination::{paginate, Page};
use crate::query::{self, SearchHit};
use crate::rebuild;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use vstore_core::{
    Chunk, ChunkId, DbConfig, DocumentId, Embedding, Filter, IndexParams, Library, LibraryId,
    Metric, MetadataMap, OpKind, VdbError, VdbResult,
};
use vstore_lock::{LockManager, ResourceKind};

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Assembles the in-memory store, the lock manager, and durable logging
/// into the one object a caller (the CLI, integration tests) talks to.
pub struct VectorDb {
    store: LibraryStore,
    locks: LockManager,
    durability: DurabilityCoordinator,
    lock_deadline: Duration,
}

impl VectorDb {
    /// Opens (recovering from) the data directory described by `config`.
    pub fn open(config: &DbConfig) -> VdbResult<Self> {
        let wal_dir = config.data_dir.join("wal");
        let snapshot_dir = config.data_dir.join("snapshots");

        let recovered = crate::recovery::recover(&wal_dir, &snapshot_dir)?;
        let durability = DurabilityCoordinator::open(
            &wal_dir,
            &snapshot_dir,
            config.wal_sync_mode,
            config.wal_segment_bytes,
            recovered.next_seq,
        )?;

        Ok(Self {
            store: recovered.store,
            locks: LockManager::new(),
            durability,
            lock_deadline: config.lock_deadline,
        })
    }

    /// Opens a fresh, empty instance rooted at `data_dir`, bypassing
    /// recovery. Used by tests that want a clean slate without caring
    /// about on-disk state left by a previous run.
    pub fn open_fresh(data_dir: impl AsRef<Path>, sync_mode: vstore_core::WalSyncMode) -> VdbResult<Self> {
        let data_dir = data_dir.as_ref();
        let durability = DurabilityCoordinator::open(
            data_dir.join("wal"),
            data_dir.join("snapshots"),
            sync_mode,
            64 * 1024 * 1024,
            1,
        )?;
        Ok(Self {
            store: LibraryStore::new(),
            locks: LockManager::new(),
            durability,
            lock_deadline: Duration::from_secs(5),
        })
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.lock_deadline
    }

    fn check_not_poisoned(&self) -> VdbResult<()> {
        if self.durability.is_poisoned() {
            return Err(VdbError::Internal("instance poisoned by a prior durability failure".into()));
        }
        Ok(())
    }

    // -- library operations --

    pub fn create_library(
        &self,
        name: String,
        description: String,
        dim: usize,
        metric: Metric,
        index_params: IndexParams,
        metadata: MetadataMap,
    ) -> VdbResult<Library> {
        self.check_not_poisoned()?;
        if dim == 0 {
            return Err(VdbError::InvalidArgument("dimension must be >= 1".into()));
        }

        let mut session = self.locks.session();
        session.write(ResourceKind::Store, "store", self.deadline())?;

        if self.store.name_taken(&name) {
            return Err(VdbError::AlreadyExists(format!("library name {name:?}")));
        }

        let payload = CreateLibraryPayload {
            id: LibraryId::new(),
            name,
            description,
            dim,
            metric,
            index_params,
            metadata,
            created_at_nanos: now_nanos(),
        };
        self.durability.append(OpKind::CreateLibrary, &payload)?;
        self.store.apply_create_library(payload.clone())?;

        self.store
            .get(payload.id)
            .map(|record| record.meta.read().clone())
            .ok_or_else(|| VdbError::Internal("library vanished immediately after creation".into()))
    }

    pub fn get_library(&self, id: LibraryId) -> VdbResult<Library> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.read(ResourceKind::Library, id.0, self.deadline())?;
        self.store
            .get(id)
            .map(|record| record.meta.read().clone())
            .ok_or_else(|| VdbError::NotFound(format!("library {id}")))
    }

    pub fn list_libraries(&self, cursor: Option<&str>, limit: usize) -> VdbResult<Page<Library>> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.read(ResourceKind::Store, "store", self.deadline())?;
        let all: Vec<Library> = self
            .store
            .list_ordered()
            .into_iter()
            .map(|record| record.meta.read().clone())
            .collect();
        Ok(paginate(&all, cursor, limit))
    }

    pub fn update_library(&self, id: LibraryId, patch: LibraryPatch) -> VdbResult<Library> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.write(ResourceKind::Store, "store", self.deadline())?;

        if self.store.get(id).is_none() {
            return Err(VdbError::NotFound(format!("library {id}")));
        }
        if let Some(new_name) = &patch.name {
            if self.store.name_taken(new_name) {
                let current = self.store.get(id).map(|r| r.meta.read().name.clone());
                if current.as_deref() != Some(new_name.as_str()) {
                    return Err(VdbError::AlreadyExists(format!("library name {new_name:?}")));
                }
            }
        }

        let payload = UpdateLibraryPayload {
            id,
            patch,
            updated_at_nanos: now_nanos(),
        };
        self.durability.append(OpKind::UpdateLibrary, &payload)?;
        self.store.apply_update_library(payload)?;

        self.store
            .get(id)
            .map(|record| record.meta.read().clone())
            .ok_or_else(|| VdbError::NotFound(format!("library {id}")))
    }

    pub fn delete_library(&self, id: LibraryId) -> VdbResult<()> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.write(ResourceKind::Store, "store", self.deadline())?;

        if self.store.get(id).is_none() {
            return Err(VdbError::NotFound(format!("library {id}")));
        }

        let payload = DeleteLibraryPayload { id };
        self.durability.append(OpKind::DeleteLibrary, &payload)?;
        self.store.apply_delete_library(payload)
    }

    pub fn rebuild_index(&self, id: LibraryId) -> VdbResult<()> {
        self.check_not_poisoned()?;
        rebuild::rebuild_library(&self.store, &self.locks, id, self.deadline())?;
        self.durability.stats.record_rebuild();
        Ok(())
    }

    // -- chunk operations --

    pub fn insert_chunk(
        &self,
        library_id: LibraryId,
        content: String,
        embedding: Embedding,
        document_id: Option<DocumentId>,
        position: Option<u64>,
        metadata: MetadataMap,
    ) -> VdbResult<Chunk> {
        self.check_not_poisoned()?;

        let mut session = self.locks.session();
        session.read(ResourceKind::Store, "store", self.deadline())?;
        let record = self.store.get(library_id).ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;

        let dim = record.meta.read().dim;
        embedding.require_dim(dim)?;

        let chunk = Chunk::new(library_id, content, embedding, document_id, position, metadata);

        session.write(ResourceKind::Library, library_id.0, self.deadline())?;
        session.write(ResourceKind::Index, library_id.0, self.deadline())?;

        let payload = InsertChunkPayload {
            library_id,
            chunk: chunk.clone(),
        };
        self.durability.append(OpKind::InsertChunk, &payload)?;
        self.store.apply_insert_chunk(payload)?;
        Ok(chunk)
    }

    pub fn insert_chunks_bulk(
        &self,
        library_id: LibraryId,
        chunks: Vec<Chunk>,
    ) -> VdbResult<Vec<Chunk>> {
        self.check_not_poisoned()?;

        let mut session = self.locks.session();
        session.read(ResourceKind::Store, "store", self.deadline())?;
        let record = self.store.get(library_id).ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;

        let dim = record.meta.read().dim;
        let mut seen = std::collections::HashSet::with_capacity(chunks.len());
        for (idx, chunk) in chunks.iter().enumerate() {
            chunk.embedding.require_dim(dim)?;
            if record.chunks.contains_key(&chunk.id) {
                return Err(VdbError::InvalidArgument(format!(
                    "chunk at index {idx} (id {}) already exists in library {library_id}",
                    chunk.id
                )));
            }
            if !seen.insert(chunk.id) {
                return Err(VdbError::InvalidArgument(format!(
                    "chunk at index {idx} (id {}) is a duplicate within this batch",
                    chunk.id
                )));
            }
        }

        session.write(ResourceKind::Library, library_id.0, self.deadline())?;
        session.write(ResourceKind::Index, library_id.0, self.deadline())?;

        let payload = InsertChunksBulkPayload {
            library_id,
            chunks: chunks.clone(),
        };
        self.durability.append(OpKind::InsertChunksBulk, &payload)?;
        self.store.apply_insert_chunks_bulk(payload)?;
        Ok(chunks)
    }

    pub fn get_chunk(&self, library_id: LibraryId, chunk_id: ChunkId) -> VdbResult<Chunk> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.read(ResourceKind::Library, library_id.0, self.deadline())?;
        let record = self.store.get(library_id).ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;
        record
            .chunks
            .get(&chunk_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| VdbError::NotFound(format!("chunk {chunk_id}")))
    }

    pub fn list_chunks(
        &self,
        library_id: LibraryId,
        document_id: Option<DocumentId>,
        cursor: Option<&str>,
        limit: usize,
    ) -> VdbResult<Page<Chunk>> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.read(ResourceKind::Library, library_id.0, self.deadline())?;
        let record = self.store.get(library_id).ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;
        let mut all: Vec<Chunk> = record.chunks.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|c| (c.created_at_nanos, c.id));
        if let Some(document_id) = document_id {
            all.retain(|c| c.document_id == Some(document_id));
        }
        Ok(paginate(&all, cursor, limit))
    }

    pub fn update_chunk_metadata(
        &self,
        library_id: LibraryId,
        chunk_id: ChunkId,
        patch: MetadataMap,
    ) -> VdbResult<Chunk> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.read(ResourceKind::Store, "store", self.deadline())?;
        session.write(ResourceKind::Library, library_id.0, self.deadline())?;

        let record = self.store.get(library_id).ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;
        if !record.chunks.contains_key(&chunk_id) {
            return Err(VdbError::NotFound(format!("chunk {chunk_id}")));
        }

        let payload = UpdateChunkMetadataPayload {
            library_id,
            chunk_id,
            patch,
            updated_at_nanos: now_nanos(),
        };
        self.durability.append(OpKind::UpdateChunkMetadata, &payload)?;
        self.store.apply_update_chunk_metadata(payload)?;

        record
            .chunks
            .get(&chunk_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| VdbError::NotFound(format!("chunk {chunk_id}")))
    }

    pub fn delete_chunk(&self, library_id: LibraryId, chunk_id: ChunkId) -> VdbResult<()> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.read(ResourceKind::Store, "store", self.deadline())?;
        session.write(ResourceKind::Library, library_id.0, self.deadline())?;
        session.write(ResourceKind::Index, library_id.0, self.deadline())?;

        let record = self.store.get(library_id).ok_or_else(|| VdbError::NotFound(format!("library {library_id}")))?;
        if !record.chunks.contains_key(&chunk_id) {
            return Err(VdbError::NotFound(format!("chunk {chunk_id}")));
        }

        let payload = DeleteChunkPayload { library_id, chunk_id };
        self.durability.append(OpKind::DeleteChunk, &payload)?;
        self.store.apply_delete_chunk(payload)
    }

    // -- search --

    pub fn search(
        &self,
        library_id: LibraryId,
        query_vector: &[f64],
        k: usize,
        filter: Option<&Filter>,
    ) -> VdbResult<Vec<SearchHit>> {
        self.search_with_multiplier(library_id, query_vector, k, filter, None)
    }

    /// As `search`, but lets the caller override the default candidate
    /// multiplier (§4.9 step 3: `k' = k * candidate-multiplier`, default 4
    /// when a filter is present, else 1).
    pub fn search_with_multiplier(
        &self,
        library_id: LibraryId,
        query_vector: &[f64],
        k: usize,
        filter: Option<&Filter>,
        multiplier: Option<usize>,
    ) -> VdbResult<Vec<SearchHit>> {
        self.check_not_poisoned()?;
        query::search(&self.store, &self.locks, library_id, query_vector, k, filter, multiplier, self.deadline())
    }

    pub fn multi_search(
        &self,
        library_ids: &[LibraryId],
        query_vector: &[f64],
        k: usize,
        filter: Option<&Filter>,
    ) -> VdbResult<Vec<(LibraryId, SearchHit)>> {
        self.check_not_poisoned()?;
        query::multi_search(&self.store, &self.locks, library_ids, query_vector, k, filter, self.deadline())
    }

    // -- durability maintenance --

    /// Takes a full snapshot of current state and truncates the WAL/older
    /// snapshots below it (§4.12). Intended to be driven by a background
    /// timer or WAL-growth trigger, not called per-request.
    pub fn snapshot_now(&self) -> VdbResult<()> {
        self.check_not_poisoned()?;
        let mut session = self.locks.session();
        session.write(ResourceKind::Store, "store", self.deadline())?;
        let seq = self.durability.peek_next_seq().saturating_sub(1);
        let body = self.store.to_snapshot();
        self.durability.snapshot(seq, &body)
    }

    pub fn rebuild_stale_indexes(&self) {
        rebuild::rebuild_stale_indexes(&self.store, &self.locks, &self.durability.stats, self.lock_deadline);
    }

    pub fn is_poisoned(&self) -> bool {
        self.durability.is_poisoned()
    }

    pub fn library_count(&self) -> usize {
        self.store.len()
    }
}
