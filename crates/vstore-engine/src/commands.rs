//! Typed payloads for each WAL `op_kind` (§6). The command router builds
//! one of these, hands it to the durability coordinator for msgpack
//! encoding + WAL append, and the identical value (whether freshly built
//! on the live path or decoded back out of a WAL record during replay)
//! drives the single `library_store::apply_*` function that actually
//! mutates memory. Keeping one payload shape for both paths is what makes
//! replay and live application provably equivalent.

use serde::{Deserialize, Serialize};
use vstore_core::{Chunk, ChunkId, IndexParams, LibraryId, Metric, MetadataMap};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLibraryPayload {
    pub id: LibraryId,
    pub name: String,
    pub description: String,
    pub dim: usize,
    pub metric: Metric,
    pub index_params: IndexParams,
    pub metadata: MetadataMap,
    pub created_at_nanos: u64,
}

/// A partial update to library-level fields. `None` leaves the field
/// unchanged; library `dim` and index type are never patchable (§3
/// invariant).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<MetadataMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLibraryPayload {
    pub id: LibraryId,
    pub patch: LibraryPatch,
    pub updated_at_nanos: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteLibraryPayload {
    pub id: LibraryId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertChunkPayload {
    pub library_id: LibraryId,
    pub chunk: Chunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertChunksBulkPayload {
    pub library_id: LibraryId,
    pub chunks: Vec<Chunk>,
}

/// Keys present in `patch` are inserted or overwritten on the chunk's
/// metadata map; keys absent from `patch` are left untouched. The
/// embedding and content are never touched by this operation (§3: a
/// chunk's embedding is immutable once inserted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChunkMetadataPayload {
    pub library_id: LibraryId,
    pub chunk_id: ChunkId,
    pub patch: MetadataMap,
    pub updated_at_nanos: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteChunkPayload {
    pub library_id: LibraryId,
    pub chunk_id: ChunkId,
}
