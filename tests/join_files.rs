//! End-to-end exercise of spec.md §8's scenario table against the
//! `join_files` demo dispatcher (`demos/join_files_support.rs`).

#[path = "../demos/join_files_support.rs"]
mod support;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use bbuild::database::memory::MemoryDatabase;
use bbuild::database::Database;
use bbuild::{AnswerContext, BError, Dispatcher, Engine, Question};

use support::{kind_set, JoinFilesDispatcher, JoinQuestion, FILE_QUESTION_UUID, JOIN_QUESTION_UUID};

/// Wraps [`JoinFilesDispatcher`], counting how many times each question kind
/// is actually dispatched - a cache hit (spec.md §4.7.1) never reaches
/// `dispatch`, so this is how the tests below observe "not re-dispatched".
#[derive(Default)]
struct CountingDispatcher {
    inner: JoinFilesDispatcher,
    file_dispatches: AtomicUsize,
    join_dispatches: AtomicUsize,
}

#[async_trait]
impl Dispatcher for CountingDispatcher {
    async fn dispatch(&self, ctx: &AnswerContext) -> Result<(), BError> {
        match ctx.question().kind_uuid() {
            FILE_QUESTION_UUID => {
                self.file_dispatches.fetch_add(1, Ordering::SeqCst);
            }
            JOIN_QUESTION_UUID => {
                self.join_dispatches.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        self.inner.dispatch(ctx).await
    }
}

fn path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

async fn build(
    database: Arc<dyn Database>,
    dispatcher: Arc<CountingDispatcher>,
    output: &str,
    inputs: Vec<String>,
) -> Result<(), BError> {
    let engine = Engine::new(database, kind_set()).build(dispatcher);
    let root: Arc<dyn Question> = Arc::new(JoinQuestion::new(output, inputs));
    engine.run(root).await.map(|_| ())
}

#[tokio::test]
async fn scenario_1_unchanged_inputs_are_not_redispatched() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let dir = TempDir::new().unwrap();
            let a = path(&dir, "a.txt");
            let b = path(&dir, "b.txt");
            let out = path(&dir, "c.txt");
            fs::write(&a, "hi").unwrap();
            fs::write(&b, "!").unwrap();

            let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());

            let first = Arc::new(CountingDispatcher::default());
            build(database.clone(), first.clone(), &out, vec![a.clone(), b.clone()])
                .await
                .unwrap();
            assert_eq!(fs::read_to_string(&out).unwrap(), "hi!");
            assert_eq!(first.join_dispatches.load(Ordering::SeqCst), 1);

            let second = Arc::new(CountingDispatcher::default());
            build(database.clone(), second.clone(), &out, vec![a, b])
                .await
                .unwrap();
            assert_eq!(
                second.join_dispatches.load(Ordering::SeqCst),
                0,
                "unchanged inputs must hit cache, not re-dispatch the join"
            );
            assert_eq!(second.file_dispatches.load(Ordering::SeqCst), 0);
        })
        .await;
}

#[tokio::test]
async fn scenario_2_changed_input_forces_rejoin() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let dir = TempDir::new().unwrap();
            let a = path(&dir, "a.txt");
            let b = path(&dir, "b.txt");
            let out = path(&dir, "c.txt");
            fs::write(&a, "hi").unwrap();
            fs::write(&b, "!").unwrap();

            let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());

            build(
                database.clone(),
                Arc::new(CountingDispatcher::default()),
                &out,
                vec![a.clone(), b.clone()],
            )
            .await
            .unwrap();
            assert_eq!(fs::read_to_string(&out).unwrap(), "hi!");

            fs::write(&a, "HI").unwrap();

            let second = Arc::new(CountingDispatcher::default());
            build(database, second.clone(), &out, vec![a, b]).await.unwrap();

            assert_eq!(fs::read_to_string(&out).unwrap(), "HI!");
            assert_eq!(
                second.join_dispatches.load(Ordering::SeqCst),
                1,
                "changed input must force the join to re-run"
            );
        })
        .await;
}

#[tokio::test]
async fn scenario_3_missing_input_fails_the_build_without_writing_output() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let dir = TempDir::new().unwrap();
            let a = path(&dir, "a.txt");
            let out = path(&dir, "c.txt");
            // `a.txt` is never created.

            let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
            let result = build(
                database.clone(),
                Arc::new(CountingDispatcher::default()),
                &out,
                vec![a],
            )
            .await;

            assert!(result.is_err());
            assert!(!dir.path().join("c.txt").exists());
            assert_eq!(
                database.all_fingerprints().await.unwrap().len(),
                0,
                "a failed dispatch performs no database write"
            );
        })
        .await;
}

#[tokio::test]
async fn recheck_forgets_an_output_edited_outside_the_engine() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let dir = TempDir::new().unwrap();
            let a = path(&dir, "a.txt");
            let b = path(&dir, "b.txt");
            let out = path(&dir, "c.txt");
            fs::write(&a, "hi").unwrap();
            fs::write(&b, "!").unwrap();

            let database: Arc<dyn Database> = Arc::new(MemoryDatabase::new());
            build(
                database.clone(),
                Arc::new(CountingDispatcher::default()),
                &out,
                vec![a.clone(), b.clone()],
            )
            .await
            .unwrap();

            // Something outside the engine rewrites the output.
            fs::write(&out, "tampered").unwrap();

            let second = Arc::new(CountingDispatcher::default());
            build(database, second.clone(), &out, vec![a, b]).await.unwrap();

            assert_eq!(fs::read_to_string(&out).unwrap(), "hi!");
            assert_eq!(
                second.join_dispatches.load(Ordering::SeqCst),
                1,
                "recheck must forget an output that no longer matches its stored answer"
            );
        })
        .await;
}

#[test]
fn uuids_are_distinct() {
    assert_ne!(FILE_QUESTION_UUID, JOIN_QUESTION_UUID);
    assert_ne!(FILE_QUESTION_UUID, Uuid::nil());
}
