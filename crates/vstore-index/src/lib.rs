pub mod handle;
pub mod hnsw;
pub mod kdtree;
pub mod lsh;
pub mod trait_def;

pub use handle::IndexHandle;
pub use hnsw::HnswIndex;
pub use kdtree::KdTreeIndex;
pub use lsh::LshIndex;
pub use trait_def::VectorIndex;
