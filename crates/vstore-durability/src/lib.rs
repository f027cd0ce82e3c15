#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

pub mod record;
pub mod snapshot;
pub mod wal;

pub use record::WalRecord;
pub use snapshot::Snapshotter;
pub use wal::Wal;
