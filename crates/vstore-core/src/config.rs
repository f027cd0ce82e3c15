use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How aggressively the WAL fsyncs before acknowledging a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalSyncMode {
    /// fsync after every append; strongest durability, lowest throughput.
    Strict,
    /// fsync on a background timer only.
    Async,
    /// fsync once per batch of appends collected under the WAL's mutex.
    Batch,
}

/// Static, process-wide configuration. Loaded from `VSTORE_*` environment
/// variables with these as fallback defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub data_dir: PathBuf,
    pub wal_sync_mode: WalSyncMode,
    pub wal_segment_bytes: u64,
    pub snapshot_interval: Duration,
    pub snapshot_wal_growth_bytes: u64,
    pub lock_deadline: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_sync_mode: WalSyncMode::Strict,
            wal_segment_bytes: 64 * 1024 * 1024,
            snapshot_interval: Duration::from_secs(300),
            snapshot_wal_growth_bytes: 32 * 1024 * 1024,
            lock_deadline: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Overlays environment variables onto the defaults. Unset or
    /// unparsable variables silently fall back rather than erroring, since
    /// this is a convenience entry point, not a validating config loader.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = std::env::var("VSTORE_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = std::env::var("VSTORE_WAL_SYNC_MODE") {
            cfg.wal_sync_mode = match mode.to_ascii_lowercase().as_str() {
                "strict" => WalSyncMode::Strict,
                "async" => WalSyncMode::Async,
                "batch" => WalSyncMode::Batch,
                _ => cfg.wal_sync_mode,
            };
        }
        if let Ok(bytes) = std::env::var("VSTORE_WAL_SEGMENT_BYTES") {
            if let Ok(parsed) = bytes.parse() {
                cfg.wal_segment_bytes = parsed;
            }
        }
        if let Ok(secs) = std::env::var("VSTORE_SNAPSHOT_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse() {
                cfg.snapshot_interval = Duration::from_secs(parsed);
            }
        }
        if let Ok(secs) = std::env::var("VSTORE_LOCK_DEADLINE_SECS") {
            if let Ok(parsed) = secs.parse() {
                cfg.lock_deadline = Duration::from_secs(parsed);
            }
        }
        cfg
    }
}

/// Live, thread-safe runtime counters surfaced for observability. Same
/// atomics-based shape as the configuration object this is grounded on,
/// repurposed from "tunable search depth" to "operational counters" since
/// per-index algorithm parameters now live on the library (`IndexParams`),
/// not globally.
#[derive(Debug, Default)]
pub struct RuntimeStats {
    pub wal_appends: AtomicU64,
    pub wal_bytes_written: AtomicU64,
    pub snapshots_taken: AtomicU64,
    pub rebuilds_triggered: AtomicU64,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_append(&self, bytes: u64) {
        self.wal_appends.fetch_add(1, Ordering::Relaxed);
        self.wal_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        self.snapshots_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rebuild(&self) {
        self.rebuilds_triggered.fetch_add(1, Ordering::Relaxed);
    }
}
