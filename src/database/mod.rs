//! Durable question → (answer, dependencies) store (spec.md §4.3).
//!
//! `get`/`put`/`forget` are the primitive operations; `recheck_all` is a
//! startup procedure built on top of them (default-implemented here once, so
//! [`memory::MemoryDatabase`] and [`sqlite::SqliteDatabase`] cannot drift).

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::codec::{BufferSink, BufferSource};
use crate::error::BError;
use crate::fingerprint::Fingerprint;
use crate::registry::KindSet;

/// A persisted answer plus the dependency fingerprints recorded alongside it
/// (spec.md §3, "Dependency record (persisted)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbEntry {
    pub answer_bytes: Vec<u8>,
    pub deps: Vec<Fingerprint>,
}

#[async_trait]
pub trait Database: Send + Sync {
    /// `None` means "unknown / must re-dispatch" (spec.md §3 invariant 2).
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DbEntry>, BError>;

    /// Atomically replaces any prior answer/deps for `fingerprint` (spec.md
    /// §3 invariant 5, §4.3's delete-then-insert-then-upsert transaction).
    async fn put(
        &self,
        fingerprint: Fingerprint,
        answer_bytes: Vec<u8>,
        deps: Vec<Fingerprint>,
    ) -> Result<(), BError>;

    /// Removes a stored answer and its dependency edges.
    async fn forget(&self, fingerprint: &Fingerprint) -> Result<(), BError>;

    /// All fingerprints with a stored answer, needed only to drive
    /// `recheck_all`.
    async fn all_fingerprints(&self) -> Result<Vec<Fingerprint>, BError>;

    /// Startup reconciliation (spec.md §4.3). For every persisted question
    /// whose kind is still registered: deserialize it, recompute its answer
    /// via `query_answer`, and `forget` it if that fails or differs from the
    /// stored bytes. Entries whose kind is no longer registered are left
    /// untouched. After this returns, every surviving entry's
    /// `query_answer` result matches its stored answer, which is the
    /// invariant the main loop's cache-hit shortcut (spec.md §4.7.1) relies
    /// on without re-querying.
    async fn recheck_all(&self, registry: &KindSet, max_len_prefix: u64) -> Result<(), BError> {
        for fingerprint in self.all_fingerprints().await? {
            let Some(kind_uuid) = fingerprint.kind_uuid() else {
                warn!(?fingerprint, "malformed fingerprint in store, forgetting");
                self.forget(&fingerprint).await?;
                continue;
            };
            let Some(kind) = registry.try_get(kind_uuid) else {
                debug!(%kind_uuid, "kind not registered, leaving entry untouched");
                continue;
            };

            let entry = match self.get(&fingerprint).await? {
                Some(entry) => entry,
                None => continue,
            };

            let mut source =
                BufferSource::with_max_len_prefix(fingerprint.question_bytes(), max_len_prefix);
            let question = match (kind.deserialize)(&mut source) {
                Ok(q) => q,
                Err(e) => {
                    warn!(?fingerprint, error = %e, "corrupt question, forgetting");
                    self.forget(&fingerprint).await?;
                    continue;
                }
            };

            match question.query_answer().await {
                Ok(fresh_answer) => {
                    let mut sink = BufferSink::new();
                    fresh_answer.serialize(&mut sink);
                    let fresh_bytes = sink.into_bytes();
                    if fresh_bytes != entry.answer_bytes {
                        debug!(?fingerprint, "stored answer stale, forgetting");
                        self.forget(&fingerprint).await?;
                    } else {
                        debug!(?fingerprint, "stored answer still valid");
                    }
                }
                Err(e) => {
                    debug!(?fingerprint, error = %e, "query_answer failed on recheck, forgetting");
                    self.forget(&fingerprint).await?;
                }
            }
        }
        Ok(())
    }
}
