use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use vstore_core::OpKind;

/// One durable mutation: `u64 seq | u64 ts_nanos | u16 op_kind | u32
/// payload_len | payload[payload_len] | u32 crc32c(payload)`, all
/// little-endian. The payload is opaque, length-prefixed msgpack produced
/// by the caller (the command router); this crate never interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct WalRecord {
    pub seq: u64,
    pub ts_nanos: u64,
    pub op_kind: OpKind,
    pub payload: Vec<u8>,
}

impl WalRecord {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 2 + 4 + self.payload.len() + 4);
        buf.write_u64::<LittleEndian>(self.seq).unwrap();
        buf.write_u64::<LittleEndian>(self.ts_nanos).unwrap();
        buf.write_u16::<LittleEndian>(self.op_kind as u16).unwrap();
        buf.write_u32::<LittleEndian>(self.payload.len() as u32).unwrap();
        buf.extend_from_slice(&self.payload);
        let crc = crc32c::crc32c(&self.payload);
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf
    }

    /// Reads one record from `r`. Returns `Ok(None)` on a clean EOF before
    /// any byte of a new record is read. Any other short read, or a CRC
    /// mismatch, is reported so the caller can treat the log as torn from
    /// that point (§4.13).
    pub fn decode_from<R: Read>(r: &mut R) -> io::Result<Option<Self>> {
        let seq = match r.read_u64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        let ts_nanos = r.read_u64::<LittleEndian>()?;
        let op_kind_raw = r.read_u16::<LittleEndian>()?;
        let payload_len = r.read_u32::<LittleEndian>()? as usize;
        let mut payload = vec![0u8; payload_len];
        r.read_exact(&mut payload)?;
        let crc_read = r.read_u32::<LittleEndian>()?;

        let op_kind = OpKind::from_u16(op_kind_raw)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unknown op_kind"))?;

        let crc_computed = crc32c::crc32c(&payload);
        if crc_computed != crc_read {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "crc32c mismatch"));
        }

        Ok(Some(WalRecord {
            seq,
            ts_nanos,
            op_kind,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let rec = WalRecord {
            seq: 7,
            ts_nanos: 12345,
            op_kind: OpKind::InsertChunk,
            payload: vec![1, 2, 3, 4, 5],
        };
        let encoded = rec.encode();
        let mut cursor = io::Cursor::new(encoded);
        let decoded = WalRecord::decode_from(&mut cursor).unwrap().unwrap();
        assert_eq!(rec, decoded);
    }

    #[test]
    fn detects_corrupted_payload() {
        let rec = WalRecord {
            seq: 1,
            ts_nanos: 1,
            op_kind: OpKind::DeleteChunk,
            payload: vec![9, 9, 9],
        };
        let mut encoded = rec.encode();
        let last = encoded.len() - 5;
        encoded[last] ^= 0xFF;
        let mut cursor = io::Cursor::new(encoded);
        assert!(WalRecord::decode_from(&mut cursor).is_err());
    }
}
