use serde::{Deserialize, Serialize};

/// Which algorithm a library's index uses. Immutable after creation,
/// matching the library's own invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Lsh,
    Hnsw,
    KdTree,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LshParams {
    pub num_tables: usize,
    pub signature_bits: usize,
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            num_tables: 4,
            signature_bits: 8,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 100,
            ef_search: 100,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KdTreeParams {
    pub leaf_size: usize,
    pub projected_dim: Option<usize>,
    pub seed: u64,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self {
            leaf_size: 16,
            projected_dim: None,
            seed: 0x5eed,
        }
    }
}

/// Closed sum of the three index parameter shapes, tagged by `IndexKind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexParams {
    Lsh(LshParams),
    Hnsw(HnswParams),
    KdTree(KdTreeParams),
}

impl IndexParams {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexParams::Lsh(_) => IndexKind::Lsh,
            IndexParams::Hnsw(_) => IndexKind::Hnsw,
            IndexParams::KdTree(_) => IndexKind::KdTree,
        }
    }
}
