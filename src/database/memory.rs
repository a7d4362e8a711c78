//! In-memory `Database`, modeled on `MemoryStore` (the teacher's
//! `store_memory.rs`) - used by the demo binary without a database path and
//! by this crate's own unit/integration tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{DbEntry, Database};
use crate::error::BError;
use crate::fingerprint::Fingerprint;

#[derive(Default)]
struct Inner {
    entries: HashMap<Fingerprint, DbEntry>,
}

pub struct MemoryDatabase {
    inner: RwLock<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DbEntry>, BError> {
        let r = self.inner.read().await;
        Ok(r.entries.get(fingerprint).cloned())
    }

    async fn put(
        &self,
        fingerprint: Fingerprint,
        answer_bytes: Vec<u8>,
        deps: Vec<Fingerprint>,
    ) -> Result<(), BError> {
        let mut w = self.inner.write().await;
        w.entries.insert(fingerprint, DbEntry { answer_bytes, deps });
        Ok(())
    }

    async fn forget(&self, fingerprint: &Fingerprint) -> Result<(), BError> {
        let mut w = self.inner.write().await;
        w.entries.remove(fingerprint);
        Ok(())
    }

    async fn all_fingerprints(&self) -> Result<Vec<Fingerprint>, BError> {
        let r = self.inner.read().await;
        Ok(r.entries.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::test_support::EchoQuestion;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let db = MemoryDatabase::new();
        let fp = Fingerprint::of(&EchoQuestion::new("a"));
        let dep = Fingerprint::of(&EchoQuestion::new("b"));

        assert!(db.get(&fp).await.unwrap().is_none());

        db.put(fp.clone(), b"answer".to_vec(), vec![dep.clone()])
            .await
            .unwrap();

        let entry = db.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.answer_bytes, b"answer");
        assert_eq!(entry.deps, vec![dep]);
    }

    #[tokio::test]
    async fn forget_removes_entry() {
        let db = MemoryDatabase::new();
        let fp = Fingerprint::of(&EchoQuestion::new("a"));
        db.put(fp.clone(), b"answer".to_vec(), vec![]).await.unwrap();
        db.forget(&fp).await.unwrap();
        assert!(db.get(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_deps_atomically() {
        let db = MemoryDatabase::new();
        let fp = Fingerprint::of(&EchoQuestion::new("a"));
        let dep1 = Fingerprint::of(&EchoQuestion::new("b"));
        let dep2 = Fingerprint::of(&EchoQuestion::new("c"));

        db.put(fp.clone(), b"v1".to_vec(), vec![dep1.clone()])
            .await
            .unwrap();
        db.put(fp.clone(), b"v2".to_vec(), vec![dep2.clone()])
            .await
            .unwrap();

        let entry = db.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.answer_bytes, b"v2");
        assert_eq!(entry.deps, vec![dep2]);
    }
}
