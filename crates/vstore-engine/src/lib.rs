pub mod commands;
pub mod coordinator;
pub mod db;
pub mod library_store;
pub mod pagination;
pub mod query;
pub mod rebuild;
pub mod recovery;

pub use commands::LibraryPatch;
pub use coordinator::DurabilityCoordinator;
pub use db::VectorDb;
pub use library_store::{LibraryRecord, LibraryStore, StoreSnapshot};
pub use pagination::Page;
pub use query::SearchHit;
pub use recovery::{recover, RecoveredState};

#[cfg(test)]
mod tests;
