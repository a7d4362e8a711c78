//! SQLite-backed `Database` (spec.md §1, "typically backed by sqlite").
//!
//! Schema is two tables, created directly rather than through
//! `sqlx::migrate!` - grounded on the teacher's `store_postgres.rs`
//! transaction shape (delete-then-insert inside one transaction per `put`),
//! simplified because there is no multi-table domain model to migrate here.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use super::{DbEntry, Database};
use crate::error::BError;
use crate::fingerprint::Fingerprint;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS answers (
    fingerprint BLOB PRIMARY KEY,
    answer_bytes BLOB NOT NULL
);
CREATE TABLE IF NOT EXISTS deps (
    fingerprint BLOB NOT NULL,
    seq INTEGER NOT NULL,
    dep BLOB NOT NULL,
    PRIMARY KEY (fingerprint, seq)
);
CREATE INDEX IF NOT EXISTS deps_by_fingerprint ON deps (fingerprint);
"#;

pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Opens (creating if absent) the sqlite file at `path` and ensures the
    /// schema exists.
    pub async fn connect(path: &str) -> Result<Self, BError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| BError::DispatchFail(e.to_string()))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory sqlite pool, kept alive for the pool's lifetime via a
    /// shared-cache URI. Used by integration tests that want sqlite's exact
    /// serialization semantics without touching the filesystem.
    pub async fn connect_in_memory() -> Result<Self, BError> {
        Self::connect("sqlite::memory:").await
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<DbEntry>, BError> {
        let fp_bytes = fingerprint.as_bytes();
        let Some(row) = sqlx::query("SELECT answer_bytes FROM answers WHERE fingerprint = ?1")
            .bind(fp_bytes)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let answer_bytes: Vec<u8> = row.get("answer_bytes");

        let dep_rows = sqlx::query("SELECT dep FROM deps WHERE fingerprint = ?1 ORDER BY seq ASC")
            .bind(fp_bytes)
            .fetch_all(&self.pool)
            .await?;
        let deps = dep_rows
            .into_iter()
            .map(|r| Fingerprint::from_bytes(r.get::<Vec<u8>, _>("dep")))
            .collect();

        Ok(Some(DbEntry { answer_bytes, deps }))
    }

    async fn put(
        &self,
        fingerprint: Fingerprint,
        answer_bytes: Vec<u8>,
        deps: Vec<Fingerprint>,
    ) -> Result<(), BError> {
        let fp_bytes = fingerprint.as_bytes().to_vec();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM answers WHERE fingerprint = ?1")
            .bind(&fp_bytes)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM deps WHERE fingerprint = ?1")
            .bind(&fp_bytes)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO answers (fingerprint, answer_bytes) VALUES (?1, ?2)")
            .bind(&fp_bytes)
            .bind(&answer_bytes)
            .execute(&mut *tx)
            .await?;
        for (seq, dep) in deps.iter().enumerate() {
            sqlx::query("INSERT INTO deps (fingerprint, seq, dep) VALUES (?1, ?2, ?3)")
                .bind(&fp_bytes)
                .bind(seq as i64)
                .bind(dep.as_bytes())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn forget(&self, fingerprint: &Fingerprint) -> Result<(), BError> {
        let fp_bytes = fingerprint.as_bytes();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM answers WHERE fingerprint = ?1")
            .bind(fp_bytes)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM deps WHERE fingerprint = ?1")
            .bind(fp_bytes)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn all_fingerprints(&self) -> Result<Vec<Fingerprint>, BError> {
        let rows = sqlx::query("SELECT fingerprint FROM answers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| Fingerprint::from_bytes(r.get::<Vec<u8>, _>("fingerprint")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::test_support::EchoQuestion;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
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
    async fn forget_removes_answer_and_deps() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        let fp = Fingerprint::of(&EchoQuestion::new("a"));
        let dep = Fingerprint::of(&EchoQuestion::new("b"));
        db.put(fp.clone(), b"answer".to_vec(), vec![dep]).await.unwrap();

        db.forget(&fp).await.unwrap();
        assert!(db.get(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_prior_deps() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        let fp = Fingerprint::of(&EchoQuestion::new("a"));
        let dep1 = Fingerprint::of(&EchoQuestion::new("b"));
        let dep2 = Fingerprint::of(&EchoQuestion::new("c"));

        db.put(fp.clone(), b"v1".to_vec(), vec![dep1]).await.unwrap();
        db.put(fp.clone(), b"v2".to_vec(), vec![dep2.clone()])
            .await
            .unwrap();

        let entry = db.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.answer_bytes, b"v2");
        assert_eq!(entry.deps, vec![dep2]);
    }

    #[tokio::test]
    async fn put_preserves_dep_call_order() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        let fp = Fingerprint::of(&EchoQuestion::new("a"));
        let deps: Vec<Fingerprint> = ["z", "m", "a", "q"]
            .iter()
            .map(|s| Fingerprint::of(&EchoQuestion::new(*s)))
            .collect();

        db.put(fp.clone(), b"answer".to_vec(), deps.clone())
            .await
            .unwrap();

        let entry = db.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.deps, deps);
    }

    #[tokio::test]
    async fn all_fingerprints_lists_every_answer() {
        let db = SqliteDatabase::connect_in_memory().await.unwrap();
        let a = Fingerprint::of(&EchoQuestion::new("a"));
        let b = Fingerprint::of(&EchoQuestion::new("b"));
        db.put(a.clone(), b"1".to_vec(), vec![]).await.unwrap();
        db.put(b.clone(), b"2".to_vec(), vec![]).await.unwrap();

        let mut all = db.all_fingerprints().await.unwrap();
        all.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(all, expected);
    }
}
