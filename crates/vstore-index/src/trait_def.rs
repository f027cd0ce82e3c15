use vstore_core::VdbResult;

/// Uniform contract shared by the three from-scratch ANN indexes. Thread
/// safety is delegated to the surrounding `INDEX` lock; implementations
/// need not be internally synchronized.
pub trait VectorIndex {
    /// Bulk construct from scratch, replacing any existing structure.
    fn build(&mut self, vectors: &[(u64, Vec<f64>)]) -> VdbResult<()>;

    /// Inserts a single vector. Fails with `DimensionMismatch` if its
    /// length differs from the dimension fixed at construction.
    fn insert(&mut self, id: u64, vector: &[f64]) -> VdbResult<()>;

    /// Tombstones `id`; it must never appear in a future search result.
    fn remove(&mut self, id: u64);

    /// Returns up to `k` `(id, distance)` pairs ascending by distance, ties
    /// broken by id. `candidate_hint` widens the internal candidate pool so
    /// callers can post-filter without losing recall.
    fn search(&self, query: &[f64], k: usize, candidate_hint: usize) -> Vec<(u64, f64)>;

    /// Number of live (non-tombstoned) vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);
}
