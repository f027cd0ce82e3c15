use thiserror::Error;

/// Error taxonomy surfaced across the whole crate, per the public command
/// surface. Validation and conflict variants are routine; `LockTimeout`,
/// `LockOrder`, `LockUpgrade` and `Cancelled` come out of the lock
/// substrate; `Internal` covers fatal, instance-poisoning failures.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VdbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lock acquisition timed out after {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("locks must be acquired in hierarchy order: {0}")]
    LockOrder(String),

    #[error("lock upgrade from reader to writer is not supported")]
    LockUpgrade,

    #[error("search spans libraries with differing dimension or metric")]
    HeterogeneousLibraries,

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type VdbResult<T> = Result<T, VdbError>;
