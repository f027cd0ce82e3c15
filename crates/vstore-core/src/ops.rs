use serde::{Deserialize, Serialize};

/// WAL `op_kind` tag (§6). Every mutating command surface operation gets
/// exactly one discriminant; read-only operations (`get_*`, `list_*`,
/// `search`) never reach the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum OpKind {
    CreateLibrary = 1,
    UpdateLibrary = 2,
    DeleteLibrary = 3,
    InsertChunk = 4,
    InsertChunksBulk = 5,
    UpdateChunkMetadata = 6,
    DeleteChunk = 7,
}

impl OpKind {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            1 => OpKind::CreateLibrary,
            2 => OpKind::UpdateLibrary,
            3 => OpKind::DeleteLibrary,
            4 => OpKind::InsertChunk,
            5 => OpKind::InsertChunksBulk,
            6 => OpKind::UpdateChunkMetadata,
            7 => OpKind::DeleteChunk,
            _ => return None,
        })
    }
}
