//! The durability coordinator (§9 design note: "the WAL sequence counter
//! and the `CURRENT` pointer are process-wide... encapsulate them in a
//! single durability coordinator object, created once at startup and shut
//! down last"). Owns the WAL, the snapshotter, and the instance-wide
//! poisoned flag that fatal errors raise (§7).

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use vstore_core::{OpKind, RuntimeStats, VdbError, VdbResult, WalSyncMode};
use vstore_durability::{Snapshotter, Wal};

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Owns the two durable subsystems (§4.11, §4.12) plus the poisoned flag
/// fatal errors raise (§7: "Fatal errors poison the instance: no further
/// mutations accepted, reads continue if possible, an operator-visible
/// flag is raised").
pub struct DurabilityCoordinator {
    pub wal: Wal,
    pub snapshotter: Snapshotter,
    pub stats: RuntimeStats,
    poisoned: AtomicBool,
}

impl DurabilityCoordinator {
    pub fn open(
        wal_dir: impl AsRef<Path>,
        snapshot_dir: impl AsRef<Path>,
        sync_mode: WalSyncMode,
        segment_rotation_bytes: u64,
        starting_seq: u64,
    ) -> VdbResult<Self> {
        let wal = Wal::open(wal_dir, sync_mode, segment_rotation_bytes, starting_seq)?;
        let snapshotter = Snapshotter::new(snapshot_dir)?;
        Ok(Self {
            wal,
            snapshotter,
            stats: RuntimeStats::new(),
            poisoned: AtomicBool::new(false),
        })
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    fn poison(&self, reason: &VdbError) {
        self.poisoned.store(true, Ordering::SeqCst);
        tracing::error!(%reason, "durability coordinator poisoned; refusing further mutations");
    }

    /// Serializes `payload` to msgpack and appends it to the WAL,
    /// fsyncing per the configured sync mode before returning (§4.11: "An
    /// operation is committed only after its record's bytes are fully
    /// written and fsynced to disk"). A write failure here is fatal and
    /// poisons the instance.
    pub fn append<T: serde::Serialize>(&self, op_kind: OpKind, payload: &T) -> VdbResult<u64> {
        if self.is_poisoned() {
            return Err(VdbError::Internal("instance poisoned by a prior durability failure".into()));
        }
        let bytes = rmp_serde::to_vec(payload).map_err(|e| VdbError::Internal(e.to_string()))?;
        let len = bytes.len() as u64;
        match self.wal.append(op_kind, bytes, now_nanos()) {
            Ok(seq) => {
                self.stats.record_append(len);
                Ok(seq)
            }
            Err(e) => {
                self.poison(&e);
                Err(e)
            }
        }
    }

    pub fn peek_next_seq(&self) -> u64 {
        self.wal.peek_next_seq()
    }

    /// Writes a snapshot of `body` stamped with `up_to_seq` (the highest
    /// WAL sequence reflected in it), records it as `CURRENT`, then
    /// truncates WAL segments and prunes older snapshots below that
    /// floor (§4.12).
    pub fn snapshot<T: serde::Serialize>(&self, up_to_seq: u64, body: &T) -> VdbResult<()> {
        tracing::info!(up_to_seq, "snapshot starting");
        self.snapshotter.write(up_to_seq, body)?;
        self.wal.truncate_before(up_to_seq)?;
        self.snapshotter.prune_before(up_to_seq)?;
        self.stats.record_snapshot();
        tracing::info!(up_to_seq, "snapshot finished");
        Ok(())
    }
}
