use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use vstore_core::{VdbError, VdbResult};

const MAGIC: u32 = 0x5653_4E50; // "VSNP"
const VERSION: u32 = 1;

/// On-disk snapshot: `u32 magic | u32 version | u64 snapshot_seq | u64
/// body_len | body (msgpack) | u32 crc32c(body)` (§6). `body` is whatever
/// msgpack-serializable state the engine hands us; this crate never
/// interprets its shape.
pub struct Snapshotter {
    dir: PathBuf,
}

/// Points at the most recently completed snapshot file, written only
/// after that file is fully synced to disk — the rename-then-pointer-
/// update sequence that makes a crash mid-snapshot harmless (§4.12).
fn current_pointer_path(dir: &Path) -> PathBuf {
    dir.join("CURRENT")
}

fn snapshot_file_name(seq: u64) -> String {
    format!("snapshot-{seq:020}.vsnp")
}

impl Snapshotter {
    pub fn new(dir: impl AsRef<Path>) -> VdbResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| VdbError::Internal(e.to_string()))?;
        Ok(Self { dir })
    }

    /// Serializes `body` to msgpack, writes it to a temp file, fsyncs,
    /// renames into place, then atomically rewrites `CURRENT` to point at
    /// it. Returns the path of the finished snapshot.
    pub fn write<T: Serialize>(&self, snapshot_seq: u64, body: &T) -> VdbResult<PathBuf> {
        let body_bytes = rmp_serde::to_vec(body).map_err(|e| VdbError::Internal(e.to_string()))?;
        let crc = crc32c::crc32c(&body_bytes);

        let final_path = self.dir.join(snapshot_file_name(snapshot_seq));
        let tmp_path = self.dir.join(format!("{}.tmp", snapshot_file_name(snapshot_seq)));

        {
            let file = File::create(&tmp_path).map_err(|e| VdbError::Internal(e.to_string()))?;
            let mut writer = BufWriter::new(file);
            writer.write_u32::<LittleEndian>(MAGIC).map_err(|e| VdbError::Internal(e.to_string()))?;
            writer.write_u32::<LittleEndian>(VERSION).map_err(|e| VdbError::Internal(e.to_string()))?;
            writer.write_u64::<LittleEndian>(snapshot_seq).map_err(|e| VdbError::Internal(e.to_string()))?;
            writer
                .write_u64::<LittleEndian>(body_bytes.len() as u64)
                .map_err(|e| VdbError::Internal(e.to_string()))?;
            writer.write_all(&body_bytes).map_err(|e| VdbError::Internal(e.to_string()))?;
            writer.write_u32::<LittleEndian>(crc).map_err(|e| VdbError::Internal(e.to_string()))?;
            writer.flush().map_err(|e| VdbError::Internal(e.to_string()))?;
            writer.get_ref().sync_all().map_err(|e| VdbError::Internal(e.to_string()))?;
        }

        fs::rename(&tmp_path, &final_path).map_err(|e| VdbError::Internal(e.to_string()))?;
        self.set_current(snapshot_seq)?;
        Ok(final_path)
    }

    fn set_current(&self, snapshot_seq: u64) -> VdbResult<()> {
        let pointer = current_pointer_path(&self.dir);
        let tmp = self.dir.join("CURRENT.tmp");
        fs::write(&tmp, snapshot_seq.to_string()).map_err(|e| VdbError::Internal(e.to_string()))?;
        fs::rename(&tmp, &pointer).map_err(|e| VdbError::Internal(e.to_string()))
    }

    /// Reads the `CURRENT` pointer, if any. Absence means a fresh
    /// instance with no snapshot yet taken.
    pub fn current_seq(&self) -> VdbResult<Option<u64>> {
        let pointer = current_pointer_path(&self.dir);
        if !pointer.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&pointer).map_err(|e| VdbError::Internal(e.to_string()))?;
        raw.trim()
            .parse()
            .map(Some)
            .map_err(|_| VdbError::Internal("malformed CURRENT pointer".into()))
    }

    /// Loads and verifies the snapshot at `seq`, deserializing its body
    /// as `T`. A checksum mismatch is reported, never silently ignored —
    /// unlike a torn WAL tail, a corrupted snapshot has no safe partial
    /// recovery.
    pub fn load<T: DeserializeOwned>(&self, seq: u64) -> VdbResult<T> {
        let path = self.dir.join(snapshot_file_name(seq));
        let file = File::open(&path).map_err(|e| VdbError::Internal(e.to_string()))?;
        let mut reader = BufReader::new(file);

        let magic = reader.read_u32::<LittleEndian>().map_err(|e| VdbError::Internal(e.to_string()))?;
        if magic != MAGIC {
            return Err(VdbError::Internal("bad snapshot magic".into()));
        }
        let version = reader.read_u32::<LittleEndian>().map_err(|e| VdbError::Internal(e.to_string()))?;
        if version != VERSION {
            return Err(VdbError::Internal(format!("unsupported snapshot version {version}")));
        }
        let stored_seq = reader.read_u64::<LittleEndian>().map_err(|e| VdbError::Internal(e.to_string()))?;
        if stored_seq != seq {
            return Err(VdbError::Internal("snapshot sequence mismatch".into()));
        }
        let body_len = reader.read_u64::<LittleEndian>().map_err(|e| VdbError::Internal(e.to_string()))? as usize;
        let mut body = vec![0u8; body_len];
        reader.read_exact(&mut body).map_err(|e| VdbError::Internal(e.to_string()))?;
        let stored_crc = reader.read_u32::<LittleEndian>().map_err(|e| VdbError::Internal(e.to_string()))?;

        if crc32c::crc32c(&body) != stored_crc {
            return Err(VdbError::Internal("snapshot checksum mismatch".into()));
        }

        rmp_serde::from_slice(&body).map_err(|e| VdbError::Internal(e.to_string()))
    }

    /// Deletes every snapshot file older than `keep_seq`, leaving the
    /// current one and the `CURRENT` pointer untouched.
    pub fn prune_before(&self, keep_seq: u64) -> VdbResult<()> {
        let entries = fs::read_dir(&self.dir).map_err(|e| VdbError::Internal(e.to_string()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(seq) = parse_snapshot_seq(name) {
                if seq < keep_seq {
                    let _ = fs::remove_file(&path);
                }
            }
        }
        Ok(())
    }
}

fn parse_snapshot_seq(name: &str) -> Option<u64> {
    name.strip_prefix("snapshot-")?.strip_suffix(".vsnp")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Body {
        libraries: Vec<String>,
        chunk_count: u64,
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path()).unwrap();
        let body = Body {
            libraries: vec!["a".into(), "b".into()],
            chunk_count: 42,
        };
        snap.write(100, &body).unwrap();

        assert_eq!(snap.current_seq().unwrap(), Some(100));
        let loaded: Body = snap.load(100).unwrap();
        assert_eq!(loaded, body);
    }

    #[test]
    fn corrupted_body_is_rejected() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path()).unwrap();
        snap.write(1, &Body { libraries: vec![], chunk_count: 0 }).unwrap();

        let path = dir.path().join(snapshot_file_name(1));
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 5;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let result: VdbResult<Body> = snap.load(1);
        assert!(result.is_err());
    }

    #[test]
    fn prune_keeps_only_recent_snapshots() {
        let dir = tempdir().unwrap();
        let snap = Snapshotter::new(dir.path()).unwrap();
        for seq in [10, 20, 30] {
            snap.write(seq, &Body { libraries: vec![], chunk_count: seq }).unwrap();
        }
        snap.prune_before(30).unwrap();
        assert!(!dir.path().join(snapshot_file_name(10)).exists());
        assert!(!dir.path().join(snapshot_file_name(20)).exists());
        assert!(dir.path().join(snapshot_file_name(30)).exists());
    }
}
