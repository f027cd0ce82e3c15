use crate::rwlock::{OwnedReadGuard, OwnedWriteGuard, ReadWriteLock};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use vstore_core::{VdbError, VdbResult};

/// Resource kinds in strict acquisition order. Any operation needing more
/// than one lock must request them in this order and release in reverse;
/// `LockSession` enforces this by rejecting an out-of-order acquisition
/// with `LockOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Store,
    Library,
    Document,
    Chunk,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(pub String);

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        ResourceId(s.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        ResourceId(s)
    }
}

impl From<uuid::Uuid> for ResourceId {
    fn from(u: uuid::Uuid) -> Self {
        ResourceId(u.to_string())
    }
}

type ResourceKey = (ResourceKind, ResourceId);

struct Entry {
    lock: Arc<ReadWriteLock>,
    refcount: usize,
}

/// Maps `(resource-kind, resource-id)` to a `ReadWriteLock`, garbage
/// collecting entries once nobody references them.
pub struct LockManager {
    entries: DashMap<ResourceKey, Entry>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    fn get_or_create(&self, key: ResourceKey) -> Arc<ReadWriteLock> {
        let mut entry = self.entries.entry(key).or_insert_with(|| Entry {
            lock: Arc::new(ReadWriteLock::new()),
            refcount: 0,
        });
        entry.refcount += 1;
        entry.lock.clone()
    }

    fn release(&self, key: &ResourceKey) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.refcount -= 1;
        }
        self.entries.remove_if(key, |_, e| e.refcount == 0);
    }

    /// Starts tracking a new ordered sequence of lock acquisitions for one
    /// logical operation.
    pub fn session(&self) -> LockSession<'_> {
        LockSession {
            manager: self,
            held: Vec::new(),
        }
    }
}

enum Held {
    Read(ResourceKey, OwnedReadGuard),
    Write(ResourceKey, OwnedWriteGuard),
}

/// Tracks the locks acquired so far within one logical operation so that
/// hierarchy order can be enforced and, on timeout, everything already
/// acquired can be released in reverse order.
pub struct LockSession<'a> {
    manager: &'a LockManager,
    held: Vec<(ResourceKind, Held)>,
}

impl<'a> LockSession<'a> {
    fn check_order(&self, kind: ResourceKind) -> VdbResult<()> {
        if let Some((last_kind, _)) = self.held.last() {
            if kind <= *last_kind {
                return Err(VdbError::LockOrder(format!(
                    "attempted to acquire {:?} after {:?}; locks must be acquired in increasing hierarchy order",
                    kind, last_kind
                )));
            }
        }
        Ok(())
    }

    /// Acquires a read lock on `(kind, id)`, enforcing hierarchy order
    /// relative to locks already held in this session. On failure,
    /// everything previously acquired in this session is released.
    pub fn read(
        &mut self,
        kind: ResourceKind,
        id: impl Into<ResourceId>,
        deadline: Instant,
    ) -> VdbResult<()> {
        if let Err(e) = self.check_order(kind) {
            self.release_all_reverse();
            return Err(e);
        }
        let key: ResourceKey = (kind, id.into());
        let lock = self.manager.get_or_create(key.clone());
        match lock.read_owned(deadline) {
            Ok(guard) => {
                tracing::trace!(?kind, id = %key.1 .0, "read lock acquired");
                self.held.push((kind, Held::Read(key, guard)));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(?kind, id = %key.1 .0, %e, "read lock acquisition failed");
                self.manager.release(&key);
                self.release_all_reverse();
                Err(e)
            }
        }
    }

    /// Acquires a write lock on `(kind, id)`, enforcing hierarchy order.
    pub fn write(
        &mut self,
        kind: ResourceKind,
        id: impl Into<ResourceId>,
        deadline: Instant,
    ) -> VdbResult<()> {
        if let Err(e) = self.check_order(kind) {
            self.release_all_reverse();
            return Err(e);
        }
        let key: ResourceKey = (kind, id.into());
        let lock = self.manager.get_or_create(key.clone());
        match lock.write_owned(deadline) {
            Ok(guard) => {
                tracing::trace!(?kind, id = %key.1 .0, "write lock acquired");
                self.held.push((kind, Held::Write(key, guard)));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(?kind, id = %key.1 .0, %e, "write lock acquisition failed");
                self.manager.release(&key);
                self.release_all_reverse();
                Err(e)
            }
        }
    }

    fn release_all_reverse(&mut self) {
        while let Some((_, held)) = self.held.pop() {
            let key = match &held {
                Held::Read(key, _) => key.clone(),
                Held::Write(key, _) => key.clone(),
            };
            drop(held);
            self.manager.release(&key);
        }
    }
}

impl Drop for LockSession<'_> {
    fn drop(&mut self) {
        self.release_all_reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(1)
    }

    #[test]
    fn ordered_acquisition_succeeds() {
        let mgr = LockManager::new();
        let mut session = mgr.session();
        session.read(ResourceKind::Store, "s", deadline()).unwrap();
        session
            .write(ResourceKind::Library, "lib1", deadline())
            .unwrap();
        session
            .write(ResourceKind::Index, "lib1", deadline())
            .unwrap();
    }

    #[test]
    fn out_of_order_acquisition_fails() {
        let mgr = LockManager::new();
        let mut session = mgr.session();
        session
            .write(ResourceKind::Library, "lib1", deadline())
            .unwrap();
        let result = session.read(ResourceKind::Store, "s", deadline());
        assert!(matches!(result, Err(VdbError::LockOrder(_))));
    }

    #[test]
    fn entries_are_garbage_collected() {
        let mgr = LockManager::new();
        {
            let mut session = mgr.session();
            session
                .write(ResourceKind::Library, "lib1", deadline())
                .unwrap();
        }
        assert_eq!(mgr.entries.len(), 0);
    }
}
