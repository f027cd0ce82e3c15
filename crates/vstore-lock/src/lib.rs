pub mod manager;
pub mod rwlock;

pub use manager::{LockManager, LockSession, ResourceId, ResourceKind};
pub use rwlock::{OwnedReadGuard, OwnedWriteGuard, ReadGuard, ReadWriteLock, WriteGuard};
