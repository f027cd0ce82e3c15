use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use vstore_core::{VdbError, VdbResult};

/// State protected by the mutex below. `waiting_writers > 0` is the writer
/// preference signal: once a writer is queued, a new reader that observes
/// it blocks behind it rather than joining the active readers.
struct State {
    active_readers: usize,
    writer_active: bool,
    waiting_writers: usize,
}

/// A fair, writer-preferring multiple-reader/single-writer lock.
///
/// Readers may hold the lock simultaneously; a writer requires exclusive
/// hold. Once a writer starts waiting, new readers queue behind it, so a
/// steady stream of readers cannot starve a writer. Upgrading a read guard
/// to a write guard is not supported; the lock is not reentrant.
pub struct ReadWriteLock {
    state: Mutex<State>,
    readers_ok: Condvar,
    writer_ok: Condvar,
}

pub struct ReadGuard<'a> {
    lock: &'a ReadWriteLock,
}

pub struct WriteGuard<'a> {
    lock: &'a ReadWriteLock,
}

impl Default for ReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadWriteLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                active_readers: 0,
                writer_active: false,
                waiting_writers: 0,
            }),
            readers_ok: Condvar::new(),
            writer_ok: Condvar::new(),
        }
    }

    pub fn read(&self, deadline: Instant) -> VdbResult<ReadGuard<'_>> {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        while guard.writer_active || guard.waiting_writers > 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
            let (g, timeout_result) = self
                .readers_ok
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
            if timeout_result.timed_out() && (guard.writer_active || guard.waiting_writers > 0) {
                return Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
        }
        guard.active_readers += 1;
        Ok(ReadGuard { lock: self })
    }

    pub fn write(&self, deadline: Instant) -> VdbResult<WriteGuard<'_>> {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.waiting_writers += 1;
        let result = loop {
            if !guard.writer_active && guard.active_readers == 0 {
                guard.writer_active = true;
                break Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
            let (g, timeout_result) = self
                .writer_ok
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
            if timeout_result.timed_out() && (guard.writer_active || guard.active_readers > 0) {
                break Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
        };
        guard.waiting_writers -= 1;
        if result.is_err() && guard.waiting_writers == 0 {
            // This was the last waiting writer; readers parked in `read`
            // solely because `waiting_writers > 0` would otherwise sleep
            // until their own deadline even though the lock is free now.
            self.readers_ok.notify_all();
        }
        result?;
        Ok(WriteGuard { lock: self })
    }

    fn release_read(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.active_readers -= 1;
        if guard.active_readers == 0 {
            self.writer_ok.notify_one();
        }
    }

    fn release_write(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.writer_active = false;
        if guard.waiting_writers > 0 {
            self.writer_ok.notify_one();
        } else {
            self.readers_ok.notify_all();
        }
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

/// An owned counterpart to `ReadGuard`/`WriteGuard` that keeps the lock
/// alive via `Arc` instead of borrowing it, for callers (like the resource
/// lock manager) that hand out per-resource locks from a concurrent map
/// rather than from a value with a stable address.
pub struct OwnedReadGuard(Arc<ReadWriteLock>);
pub struct OwnedWriteGuard(Arc<ReadWriteLock>);

impl ReadWriteLock {
    pub fn read_owned(self: &Arc<Self>, deadline: Instant) -> VdbResult<OwnedReadGuard> {
        // Mirrors `read`'s wait loop against the shared Arc rather than a
        // borrowed guard, so the lock can outlive this call.
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        while guard.writer_active || guard.waiting_writers > 0 {
            let now = Instant::now();
            if now >= deadline {
                return Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
            let (g, timeout_result) = self
                .readers_ok
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
            if timeout_result.timed_out() && (guard.writer_active || guard.waiting_writers > 0) {
                return Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
        }
        guard.active_readers += 1;
        Ok(OwnedReadGuard(self.clone()))
    }

    pub fn write_owned(self: &Arc<Self>, deadline: Instant) -> VdbResult<OwnedWriteGuard> {
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        guard.waiting_writers += 1;
        let result = loop {
            if !guard.writer_active && guard.active_readers == 0 {
                guard.writer_active = true;
                break Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
            let (g, timeout_result) = self
                .writer_ok
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|p| p.into_inner());
            guard = g;
            if timeout_result.timed_out() && (guard.writer_active || guard.active_readers > 0) {
                break Err(VdbError::LockTimeout(Duration::from_secs(0)));
            }
        };
        guard.waiting_writers -= 1;
        if result.is_err() && guard.waiting_writers == 0 {
            self.readers_ok.notify_all();
        }
        result?;
        Ok(OwnedWriteGuard(self.clone()))
    }
}

impl Drop for OwnedReadGuard {
    fn drop(&mut self) {
        self.0.release_read();
    }
}

impl Drop for OwnedWriteGuard {
    fn drop(&mut self) {
        self.0.release_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn readers_share_the_lock() {
        let lock = ReadWriteLock::new();
        let deadline = Instant::now() + Duration::from_secs(1);
        let g1 = lock.read(deadline).unwrap();
        let g2 = lock.read(deadline).unwrap();
        drop(g1);
        drop(g2);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = ReadWriteLock::new();
        let deadline = Instant::now() + Duration::from_millis(50);
        let _w = lock.write(Instant::now() + Duration::from_secs(1)).unwrap();
        assert!(lock.read(deadline).is_err());
    }

    #[test]
    fn writer_does_not_starve() {
        let lock = Arc::new(ReadWriteLock::new());
        let writer_done = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mut reader_handles = Vec::new();
        for _ in 0..10 {
            let lock = lock.clone();
            let stop = stop.clone();
            reader_handles.push(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    if let Ok(g) = lock.read(Instant::now() + Duration::from_millis(50)) {
                        drop(g);
                    }
                }
            }));
        }

        let writer_lock = lock.clone();
        let writer_flag = writer_done.clone();
        let writer = thread::spawn(move || {
            let got = writer_lock.write(Instant::now() + Duration::from_secs(5));
            if got.is_ok() {
                writer_flag.store(1, Ordering::Relaxed);
            }
        });

        writer.join().unwrap();
        stop.store(true, Ordering::Relaxed);
        for h in reader_handles {
            let _ = h.join();
        }
        assert_eq!(writer_done.load(Ordering::Relaxed), 1);
    }
}
