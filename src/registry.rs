//! Question/answer registry.
//!
//! `KindSet` maps UUIDs to question kinds. It is built once at startup from
//! the kinds the application registers and is immutable thereafter - the
//! database needs it to deserialize questions during recheck.

use std::collections::HashMap;

use uuid::Uuid;

use std::sync::Arc;

use crate::codec::ByteSource;
use crate::error::{BError, CodecError};
use crate::question::{Answer, Question};

/// A function that reconstructs a boxed question of one kind from its
/// serialized bytes (the part of a fingerprint after the 16-byte UUID
/// prefix).
pub type QuestionFactory = fn(&mut dyn ByteSource) -> Result<Box<dyn Question>, CodecError>;

/// A function that reconstructs an answer of one kind from its serialized
/// `answer_bytes`. Needed only by the main loop's cache-hit delivery path:
/// handing a cached answer back to a waiter requires a live `Arc<dyn
/// Answer>`, not just the bytes the database stores.
pub type AnswerFactory = fn(&mut dyn ByteSource) -> Result<Arc<dyn Answer>, CodecError>;

/// One question kind's entry in the registry: its UUID plus the per-kind
/// operations the registry itself needs (deserialization of both the
/// question and its answer kind). The remaining per-kind operations
/// (`serialize`, `query_answer`) live on the `Question`/`Answer` trait
/// objects themselves once deserialized.
#[derive(Clone, Copy)]
pub struct QuestionKind {
    pub uuid: Uuid,
    pub name: &'static str,
    pub deserialize: QuestionFactory,
    pub deserialize_answer: AnswerFactory,
}

impl std::fmt::Debug for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionKind")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .finish()
    }
}

/// Immutable UUID → `QuestionKind` map, built once at startup.
#[derive(Debug, Default, Clone)]
pub struct KindSet {
    kinds: HashMap<Uuid, QuestionKind>,
}

impl KindSet {
    pub fn builder() -> KindSetBuilder {
        KindSetBuilder::default()
    }

    pub fn get(&self, uuid: Uuid) -> Result<&QuestionKind, BError> {
        self.kinds.get(&uuid).ok_or(BError::KindUnknown { uuid })
    }

    /// Like [`Self::get`], but returns `None` rather than an error - used by
    /// `recheck_all`, which silently skips entries whose kind is no longer
    /// registered instead of failing the whole recheck.
    pub fn try_get(&self, uuid: Uuid) -> Option<&QuestionKind> {
        self.kinds.get(&uuid)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct KindSetBuilder {
    kinds: HashMap<Uuid, QuestionKind>,
}

impl KindSetBuilder {
    pub fn register(mut self, kind: QuestionKind) -> Self {
        self.kinds.insert(kind.uuid, kind);
        self
    }

    pub fn build(self) -> KindSet {
        KindSet { kinds: self.kinds }
    }
}
