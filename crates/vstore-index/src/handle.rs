use crate::hnsw::HnswIndex;
use crate::kdtree::KdTreeIndex;
use crate::lsh::LshIndex;
use crate::trait_def::VectorIndex;
use vstore_core::{IndexParams, Metric, VdbResult};

/// Closed sum over the three concrete index algorithms. A tagged enum is
/// used instead of `dyn VectorIndex` because the set of variants is fixed
/// and snapshot (de)serialization needs to match exhaustively on a known
/// shape rather than through an opaque trait object.
pub enum IndexHandle {
    Lsh(LshIndex),
    Hnsw(HnswIndex),
    KdTree(KdTreeIndex),
}

impl IndexHandle {
    pub fn new(dim: usize, metric: Metric, params: IndexParams) -> Self {
        match params {
            IndexParams::Lsh(p) => {
                IndexHandle::Lsh(LshIndex::new(dim, metric, p.num_tables, p.signature_bits, p.seed))
            }
            IndexParams::Hnsw(p) => IndexHandle::Hnsw(HnswIndex::new(dim, metric, p)),
            IndexParams::KdTree(p) => IndexHandle::KdTree(KdTreeIndex::new(dim, metric, p)),
        }
    }

    /// Fraction of structurally-present ids that are tombstoned. HNSW and
    /// KD-tree schedule a rebuild past 30% (§4.6/§4.7); LSH has no such
    /// trigger defined in its own section, so it reports 0.0 and is never
    /// proactively rebuilt by ratio.
    pub fn tombstone_ratio(&self) -> f64 {
        match self {
            IndexHandle::Lsh(_) => 0.0,
            IndexHandle::Hnsw(i) => i.tombstone_ratio(),
            IndexHandle::KdTree(i) => i.tombstone_ratio(),
        }
    }

    pub fn build(&mut self, vectors: &[(u64, Vec<f64>)]) -> VdbResult<()> {
        match self {
            IndexHandle::Lsh(i) => i.build(vectors),
            IndexHandle::Hnsw(i) => i.build(vectors),
            IndexHandle::KdTree(i) => i.build(vectors),
        }
    }

    pub fn insert(&mut self, id: u64, vector: &[f64]) -> VdbResult<()> {
        match self {
            IndexHandle::Lsh(i) => i.insert(id, vector),
            IndexHandle::Hnsw(i) => i.insert(id, vector),
            IndexHandle::KdTree(i) => i.insert(id, vector),
        }
    }

    pub fn remove(&mut self, id: u64) {
        match self {
            IndexHandle::Lsh(i) => i.remove(id),
            IndexHandle::Hnsw(i) => i.remove(id),
            IndexHandle::KdTree(i) => i.remove(id),
        }
    }

    pub fn search(&self, query: &[f64], k: usize, candidate_hint: usize) -> Vec<(u64, f64)> {
        match self {
            IndexHandle::Lsh(i) => i.search(query, k, candidate_hint),
            IndexHandle::Hnsw(i) => i.search(query, k, candidate_hint),
            IndexHandle::KdTree(i) => i.search(query, k, candidate_hint),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexHandle::Lsh(i) => i.len(),
            IndexHandle::Hnsw(i) => i.len(),
            IndexHandle::KdTree(i) => i.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            IndexHandle::Lsh(i) => i.clear(),
            IndexHandle::Hnsw(i) => i.clear(),
            IndexHandle::KdTree(i) => i.clear(),
        }
    }
}
