use crate::record::WalRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use vstore_core::{VdbError, VdbResult, WalSyncMode};

struct Segment {
    writer: BufWriter<File>,
    bytes_written: u64,
}

/// Append-only, single-active-segment write-ahead log. `append` writes and
/// (depending on `WalSyncMode`) fsyncs before returning, matching the
/// commit rule in §4.11: a mutation is durable only once its record is
/// fully written and fsynced. All appends serialize through one mutex,
/// which is the WAL's entire concurrency story (§5 shared-resource
/// policy) — the lock manager's STORE lock is never held across this call.
pub struct Wal {
    dir: PathBuf,
    segment: Mutex<Segment>,
    sync_mode: WalSyncMode,
    segment_rotation_bytes: u64,
    next_seq: AtomicU64,
    segment_index: AtomicU64,
}

fn segment_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("wal-{index:020}.log"))
}

impl Wal {
    /// Opens (or creates) the WAL directory and its active segment,
    /// starting sequence allocation at `starting_seq` (the recovered
    /// instance's last-applied sequence plus one).
    pub fn open(
        dir: impl AsRef<Path>,
        sync_mode: WalSyncMode,
        segment_rotation_bytes: u64,
        starting_seq: u64,
    ) -> VdbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| VdbError::Internal(e.to_string()))?;

        let segment_index = latest_segment_index(&dir).unwrap_or(0);
        let path = segment_path(&dir, segment_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| VdbError::Internal(e.to_string()))?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            dir,
            segment: Mutex::new(Segment {
                writer: BufWriter::new(file),
                bytes_written,
            }),
            sync_mode,
            segment_rotation_bytes,
            next_seq: AtomicU64::new(starting_seq),
            segment_index: AtomicU64::new(segment_index),
        })
    }

    /// Sequence that would be assigned to the next appended record.
    pub fn peek_next_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Appends one record, assigning it the next sequence number. Returns
    /// the assigned sequence. Fsyncs per `sync_mode` before returning
    /// under `Strict`; `Batch` and `Async` fsync is driven by the caller
    /// (the durability coordinator's background flush) instead.
    pub fn append(&self, op_kind: vstore_core::OpKind, payload: Vec<u8>, ts_nanos: u64) -> VdbResult<u64> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let record = WalRecord {
            seq,
            ts_nanos,
            op_kind,
            payload,
        };
        let encoded = record.encode();

        let mut segment = self.segment.lock();
        segment
            .writer
            .write_all(&encoded)
            .map_err(|e| VdbError::Internal(e.to_string()))?;
        segment.bytes_written += encoded.len() as u64;

        if matches!(self.sync_mode, WalSyncMode::Strict) {
            segment.writer.flush().map_err(|e| VdbError::Internal(e.to_string()))?;
            segment
                .writer
                .get_ref()
                .sync_data()
                .map_err(|e| VdbError::Internal(e.to_string()))?;
        }

        let needs_rotation = segment.bytes_written >= self.segment_rotation_bytes;
        drop(segment);
        if needs_rotation {
            self.rotate()?;
        }

        Ok(seq)
    }

    /// Flushes and fsyncs the active segment. Called by `Async`/`Batch`
    /// sync modes on their own schedule, and always safe to call under
    /// `Strict` (a no-op there since every append already synced).
    pub fn sync(&self) -> VdbResult<()> {
        let mut segment = self.segment.lock();
        segment.writer.flush().map_err(|e| VdbError::Internal(e.to_string()))?;
        segment
            .writer
            .get_ref()
            .sync_data()
            .map_err(|e| VdbError::Internal(e.to_string()))
    }

    fn rotate(&self) -> VdbResult<()> {
        let mut segment = self.segment.lock();
        segment.writer.flush().map_err(|e| VdbError::Internal(e.to_string()))?;
        let new_index = self.segment_index.fetch_add(1, Ordering::SeqCst) + 1;
        let path = segment_path(&self.dir, new_index);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| VdbError::Internal(e.to_string()))?;
        *segment = Segment {
            writer: BufWriter::new(file),
            bytes_written: 0,
        };
        Ok(())
    }

    /// Deletes every non-active segment whose last contained sequence is
    /// `< floor`. Called by the snapshotter after recording a new
    /// `CURRENT` pointer.
    pub fn truncate_before(&self, floor: u64) -> VdbResult<()> {
        let active = self.segment_index.load(Ordering::SeqCst);
        for (index, path) in list_segments(&self.dir) {
            if index == active {
                continue;
            }
            let last_seq = last_sequence_in(&path).unwrap_or(0);
            if last_seq != 0 && last_seq < floor {
                let _ = fs::remove_file(&path);
            }
        }
        Ok(())
    }

    /// Replays every record across all segments from `from_seq` onward,
    /// calling `apply` for each in order. On the first checksum failure or
    /// sequence gap, truncates the offending segment's file at that byte
    /// offset (treating the remainder as a torn write, per §4.13) and
    /// stops replay.
    pub fn replay<F: FnMut(WalRecord) -> VdbResult<()>>(
        dir: impl AsRef<Path>,
        from_seq: u64,
        mut apply: F,
    ) -> VdbResult<u64> {
        let dir = dir.as_ref();
        let mut last_applied = from_seq.saturating_sub(1);
        for (_, path) in list_segments(dir) {
            let file = match File::open(&path) {
                Ok(f) => f,
                Err(_) => continue,
            };
            let mut reader = BufReader::new(file);
            let mut offset: u64 = 0;
            loop {
                let before = offset;
                match WalRecord::decode_from(&mut reader) {
                    Ok(Some(record)) => {
                        offset = before + encoded_len(&record);
                        if record.seq < from_seq {
                            continue;
                        }
                        if record.seq != last_applied + 1 {
                            tracing::warn!(
                                path = %path.display(),
                                expected = last_applied + 1,
                                found = record.seq,
                                "WAL sequence gap; truncating at torn write"
                            );
                            truncate_at(&path, before)?;
                            return Ok(last_applied);
                        }
                        last_applied = record.seq;
                        apply(record)?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            offset = before,
                            %e,
                            "WAL corruption detected; truncating at torn write"
                        );
                        truncate_at(&path, before)?;
                        return Ok(last_applied);
                    }
                }
            }
        }
        Ok(last_applied)
    }
}

fn encoded_len(record: &WalRecord) -> u64 {
    (8 + 8 + 2 + 4 + record.payload.len() + 4) as u64
}

fn truncate_at(path: &Path, offset: u64) -> VdbResult<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| VdbError::Internal(e.to_string()))?;
    file.set_len(offset).map_err(|e| VdbError::Internal(e.to_string()))?;
    let mut f = file;
    f.seek(SeekFrom::Start(offset)).map_err(|e| VdbError::Internal(e.to_string()))?;
    Ok(())
}

fn list_segments(dir: &Path) -> Vec<(u64, PathBuf)> {
    let mut segments = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return segments,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if let Some(index) = parse_segment_index(name) {
                segments.push((index, path));
            }
        }
    }
    segments.sort_by_key(|(index, _)| *index);
    segments
}

fn parse_segment_index(name: &str) -> Option<u64> {
    let stripped = name.strip_prefix("wal-")?.strip_suffix(".log")?;
    stripped.parse().ok()
}

fn latest_segment_index(dir: &Path) -> Option<u64> {
    list_segments(dir).last().map(|(index, _)| *index)
}

fn last_sequence_in(path: &Path) -> Option<u64> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let mut last = None;
    while let Ok(Some(record)) = WalRecord::decode_from(&mut reader) {
        last = Some(record.seq);
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use vstore_core::OpKind;

    #[test]
    fn append_then_replay_recovers_all_records() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalSyncMode::Strict, 64 * 1024 * 1024, 1).unwrap();
        for i in 0..10u64 {
            wal.append(OpKind::InsertChunk, vec![i as u8], i).unwrap();
        }

        let mut applied = Vec::new();
        let last = Wal::replay(dir.path(), 1, |r| {
            applied.push(r.seq);
            Ok(())
        })
        .unwrap();

        assert_eq!(applied, (1..=10).collect::<Vec<_>>());
        assert_eq!(last, 10);
    }

    #[test]
    fn torn_write_truncates_and_stops_replay() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalSyncMode::Strict, 64 * 1024 * 1024, 1).unwrap();
        wal.append(OpKind::InsertChunk, vec![1], 1).unwrap();
        wal.append(OpKind::InsertChunk, vec![2], 2).unwrap();
        wal.sync().unwrap();
        drop(wal);

        // Simulate a crash mid-write of a third record.
        let path = segment_path(dir.path(), 0);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0xAA; 10]).unwrap();

        let mut applied = Vec::new();
        let last = Wal::replay(dir.path(), 1, |r| {
            applied.push(r.seq);
            Ok(())
        })
        .unwrap();

        assert_eq!(applied, vec![1, 2]);
        assert_eq!(last, 2);
    }

    #[test]
    fn rotates_to_a_new_segment_past_the_size_threshold() {
        let dir = tempdir().unwrap();
        let wal = Wal::open(dir.path(), WalSyncMode::Strict, 64, 1).unwrap();
        for i in 0..20u64 {
            wal.append(OpKind::InsertChunk, vec![0u8; 16], i).unwrap();
        }
        assert!(list_segments(dir.path()).len() > 1);

        let mut applied = Vec::new();
        Wal::replay(dir.path(), 1, |r| {
            applied.push(r.seq);
            Ok(())
        })
        .unwrap();
        assert_eq!(applied, (1..=20).collect::<Vec<_>>());
    }
}
