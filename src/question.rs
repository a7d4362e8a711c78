//! Question and answer kinds.
//!
//! A question kind is a record of operations for one question type: a UUID,
//! an answer kind, and ways to query, compare, and (de)serialize instances.
//! Rust expresses that operations record as two traits (`Question`, `Answer`)
//! plus a per-kind deserialize function pointer registered in
//! [`crate::registry::KindSet`] - trait objects stand in for the vtable.
//!
//! Identity comparison is realized as fingerprint byte equality rather than
//! a bespoke per-kind method: since `serialize` is required to be
//! deterministic, two questions are "the same subject matter" exactly when
//! their fingerprints match. Copying a foreign-owned question has no
//! counterpart here - Rust ownership makes it unnecessary.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::codec::ByteSink;
use crate::error::BError;

/// An immutable, serializable, equality-comparable result of a question.
///
/// Equality and deserialization are deliberately absent from this trait:
/// recheck compares a freshly computed answer's *serialized bytes* against
/// the stored `answer_bytes`, so no kind needs to implement answer equality
/// or an answer deserializer at all.
pub trait Answer: Send + Sync + fmt::Debug {
    /// Deterministic serialization, used both for the persisted
    /// `answer_bytes` column and for recheck comparison.
    fn serialize(&self, sink: &mut dyn ByteSink);

    /// Supports downcasting a `dyn Answer` back to the dispatcher's concrete
    /// answer type after a `need` call resolves.
    fn as_any(&self) -> &dyn Any;
}

/// An immutable value identifying a unit of work.
#[async_trait]
pub trait Question: Send + Sync + fmt::Debug {
    /// UUID of this question's kind. Transitively identifies the answer
    /// kind too.
    fn kind_uuid(&self) -> Uuid;

    /// Deterministic serialization.
    fn serialize(&self, sink: &mut dyn ByteSink);

    /// Computes an answer from the outside world - e.g. hashing a file.
    /// Invoked by `succeed()` and by `recheck_all`; never invoked
    /// concurrently with another operation on the same question under this
    /// crate's single-threaded scheduling model.
    async fn query_answer(&self) -> Result<Arc<dyn Answer>, BError>;

    /// Supports downcasting a `dyn Question` back to a dispatcher's concrete
    /// question type - needed by a dispatcher that `need`s further questions
    /// derived from fields the `Question`/`Answer` traits don't expose (e.g.
    /// a join question's list of inputs).
    fn as_any(&self) -> &dyn Any;
}
