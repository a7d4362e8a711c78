//! Crate-wide error kinds (spec.md §7).

use crate::fingerprint::Fingerprint;
use uuid::Uuid;

/// Errors that can escape the byte-sink/byte-source codec (spec.md §4.1).
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("attempted to read past end of source")]
    Short,

    #[error("length prefix {len} exceeds configured maximum {max}")]
    Overflow { len: u64, max: u64 },
}

/// The engine's single error type. Variant names track the "Kind" column of
/// spec.md §7, not Rust naming convention for its own sake - a reviewer
/// comparing this enum against the spec table should see the same names.
#[derive(Debug, thiserror::Error)]
pub enum BError {
    #[error("codec error reading fingerprint {fingerprint:?}: {source}")]
    CodecShort {
        fingerprint: Fingerprint,
        #[source]
        source: CodecError,
    },

    #[error("question kind {uuid} is not registered")]
    KindUnknown { uuid: Uuid },

    #[error("durable store I/O error: {0}")]
    StoreIO(#[from] sqlx::Error),

    #[error("dispatcher failed: {0}")]
    DispatchFail(String),

    #[error("child process exited with non-zero status: {0}")]
    ChildNonZero(i64),

    #[error("child process terminated by signal {0}")]
    ChildSignal(i32),

    #[error("cycle detected: question {0:?} depends on itself")]
    Cycle(Fingerprint),

    #[error("enqueue attempted after queue was closed")]
    QueueClosed,
}

impl BError {
    /// True for the failure modes spec.md §7 marks "Fatal" - the main loop
    /// aborts the whole run rather than failing only the affected subtree.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BError::StoreIO(_) | BError::QueueClosed)
    }
}

pub type Result<T> = std::result::Result<T, BError>;
