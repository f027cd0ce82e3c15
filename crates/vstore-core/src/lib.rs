pub mod config;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod ops;
pub mod params;
pub mod vector;

pub use config::{DbConfig, RuntimeStats, WalSyncMode};
pub use error::{VdbError, VdbResult};
pub use ids::{ChunkId, DocumentId, LibraryId};
pub use metadata::{Filter, FilterContext, MetadataMap, MetadataValue, Predicate};
pub use ops::OpKind;
pub use params::{HnswParams, IndexKind, IndexParams, KdTreeParams, LshParams};
pub use vector::{cosine, dot, euclidean, Embedding, Metric};

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// A named collection of chunks sharing a dimension and an index algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub description: String,
    pub dim: usize,
    pub metric: Metric,
    pub index_params: IndexParams,
    pub metadata: MetadataMap,
    pub created_at_nanos: u64,
    pub updated_at_nanos: u64,
}

impl Library {
    pub fn new(
        name: String,
        description: String,
        dim: usize,
        metric: Metric,
        index_params: IndexParams,
        metadata: MetadataMap,
    ) -> VdbResult<Self> {
        if dim == 0 {
            return Err(VdbError::InvalidArgument("dimension must be >= 1".into()));
        }
        let now = now_nanos();
        Ok(Self {
            id: LibraryId::new(),
            name,
            description,
            dim,
            metric,
            index_params,
            metadata,
            created_at_nanos: now,
            updated_at_nanos: now,
        })
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index_params.kind()
    }
}

/// The atomic indexed unit: text plus embedding plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub library_id: LibraryId,
    pub content: String,
    pub embedding: Embedding,
    pub document_id: Option<DocumentId>,
    pub position: Option<u64>,
    pub metadata: MetadataMap,
    pub created_at_nanos: u64,
    pub updated_at_nanos: u64,
}

impl Chunk {
    pub fn new(
        library_id: LibraryId,
        content: String,
        embedding: Embedding,
        document_id: Option<DocumentId>,
        position: Option<u64>,
        metadata: MetadataMap,
    ) -> Self {
        let now = now_nanos();
        Self {
            id: ChunkId::new(),
            library_id,
            content,
            embedding,
            document_id,
            position,
            metadata,
            created_at_nanos: now,
            updated_at_nanos: now,
        }
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredId {
    pub id: ChunkId,
    pub distance: f64,
}
