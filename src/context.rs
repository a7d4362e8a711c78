//! Answer context: the per-in-flight-question state machine (spec.md §4.5).
//!
//! ```text
//! NEW ──dispatch──▶ RUNNING ──need──▶ WAITING ──all-resolved──▶ RUNNING
//!                      │                  │
//!                      ├──succeed(a)──▶ RESOLVED(a)
//!                      ├──succeed()   ──▶ RESOLVED(query_answer())
//!                      └──fail(e)     ──▶ FAILED
//! ```
//!
//! `fail` has no explicit method here: the dispatcher contract (spec.md §6)
//! is expressed as `Dispatcher::dispatch` returning `Result<(), BError>` -
//! an `Err` is exactly `ctx.fail(e)`, propagated with ordinary `?` rather
//! than a separate call. See DESIGN.md ("fail as Err propagation").

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::codec::BufferSink;
use crate::engine::EngineShared;
use crate::error::BError;
use crate::fingerprint::Fingerprint;
use crate::process::ExitStatus;
use crate::question::{Answer, Question};

#[derive(Debug, Clone, PartialEq)]
enum State {
    Running,
    Waiting,
    Resolved,
    Failed,
}

/// One in-flight question's state, shared between the task running its
/// dispatcher and `Engine::dispatch_one`'s bookkeeping.
pub struct AnswerContext {
    pub(crate) engine: Arc<EngineShared>,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) question: Arc<dyn Question>,
    /// Fingerprints of this context's own ancestors via `need`, root-most
    /// first, used to detect a question depending on itself (spec.md
    /// §4.5.4) before ever touching the queue.
    pub(crate) ancestors: Arc<Vec<Fingerprint>>,
    state: AsyncMutex<State>,
    deps_collected: AsyncMutex<Vec<Fingerprint>>,
}

impl fmt::Debug for AnswerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerContext")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl AnswerContext {
    pub(crate) fn new(
        engine: Arc<EngineShared>,
        fingerprint: Fingerprint,
        question: Arc<dyn Question>,
        ancestors: Arc<Vec<Fingerprint>>,
    ) -> Self {
        Self {
            engine,
            fingerprint,
            question,
            ancestors,
            state: AsyncMutex::new(State::Running),
            deps_collected: AsyncMutex::new(Vec::new()),
        }
    }

    pub fn question(&self) -> &dyn Question {
        &*self.question
    }

    /// spec.md §4.5.1. Duplicate questions are de-duplicated; their output
    /// slots all point at the same resolved answer. Every non-duplicate
    /// dependency is enqueued and awaited together, so the dispatcher
    /// resumes once, after the last one resolves, with answers in input
    /// order (spec.md §5, "Ordering").
    pub async fn need(
        &self,
        deps: Vec<Arc<dyn Question>>,
    ) -> Result<Vec<Option<Arc<dyn Answer>>>, BError> {
        *self.state.lock().await = State::Waiting;

        let mut first_seen: Vec<Fingerprint> = Vec::new();
        let mut slot_of: Vec<usize> = Vec::with_capacity(deps.len());
        let mut distinct: Vec<Arc<dyn Question>> = Vec::new();

        for q in &deps {
            let fp = Fingerprint::of(&**q);
            if let Some(pos) = first_seen.iter().position(|f| f == &fp) {
                slot_of.push(pos);
            } else {
                slot_of.push(first_seen.len());
                first_seen.push(fp);
                distinct.push(q.clone());
            }
        }

        let mut child_ancestors = (*self.ancestors).clone();
        child_ancestors.push(self.fingerprint.clone());
        let child_ancestors = Arc::new(child_ancestors);

        let mut receivers = Vec::with_capacity(distinct.len());
        for (fp, q) in first_seen.iter().zip(distinct.into_iter()) {
            if *fp == self.fingerprint || self.ancestors.contains(fp) {
                return Err(BError::Cycle(fp.clone()));
            }
            let rx = self
                .engine
                .enqueue_need(q, child_ancestors.clone())
                .await?;
            receivers.push(rx);
        }

        let mut distinct_answers = Vec::with_capacity(receivers.len());
        for rx in receivers {
            let answer = rx.await.unwrap_or(None);
            distinct_answers.push(answer);
        }

        {
            let mut deps_collected = self.deps_collected.lock().await;
            for fp in &first_seen {
                if !deps_collected.contains(fp) {
                    deps_collected.push(fp.clone());
                }
            }
        }

        *self.state.lock().await = State::Running;
        Ok(slot_of.into_iter().map(|i| distinct_answers[i].clone()).collect())
    }

    /// Runs a child process through the engine's `ProcessSupervisor` (spec.md
    /// §4.6). A dispatcher uses this instead of spawning directly so every
    /// child stays reapable by the one supervisor the engine owns for the
    /// run's lifetime.
    pub async fn run_process(&self, argv: &[String]) -> Result<ExitStatus, BError> {
        self.engine.supervisor.run(argv).await
    }

    /// `succeed()` (spec.md §4.5.2): computes the answer via `query_answer`
    /// and persists it with whatever dependencies were collected by prior
    /// `need` calls.
    pub async fn succeed(&self) -> Result<(), BError> {
        let answer = self.question.query_answer().await?;
        self.succeed_answer(answer).await
    }

    /// `succeed_answer(a)` (spec.md §4.5.2): stores `a` directly, skipping
    /// `query_answer`.
    pub async fn succeed_answer(&self, answer: Arc<dyn Answer>) -> Result<(), BError> {
        let mut sink = BufferSink::new();
        answer.serialize(&mut sink);
        let deps = self.deps_collected.lock().await.clone();

        self.engine
            .database
            .put(self.fingerprint.clone(), sink.into_bytes(), deps)
            .await?;

        *self.state.lock().await = State::Resolved;
        self.engine.resolve(&self.fingerprint, Some(answer)).await;
        Ok(())
    }

    /// Invoked by the engine when `Dispatcher::dispatch` returns `Err` -
    /// the `fail(e)` transition of spec.md §4.5.3. No database write; every
    /// waiter is notified with `None`.
    pub(crate) async fn fail(&self) {
        *self.state.lock().await = State::Failed;
        self.engine.resolve(&self.fingerprint, None).await;
    }

    pub(crate) async fn is_resolved(&self) -> bool {
        matches!(*self.state.lock().await, State::Resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryDatabase;
    use crate::dispatcher::LeafDispatcher;
    use crate::engine::Engine;
    use crate::question::test_support::{EchoAnswer, EchoQuestion, ECHO_QUESTION_UUID};
    use crate::registry::{KindSet, QuestionKind};

    fn kind_set() -> KindSet {
        KindSet::builder()
            .register(QuestionKind {
                uuid: ECHO_QUESTION_UUID,
                name: "echo",
                deserialize: EchoQuestion::deserialize,
                deserialize_answer: EchoAnswer::deserialize,
            })
            .build()
    }

    #[tokio::test]
    async fn need_deduplicates_identical_questions() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let engine = Engine::new(Arc::new(MemoryDatabase::new()), kind_set()).build(Arc::new(LeafDispatcher));
                let root = Arc::new(EchoQuestion::new("root"));
                let ctx = engine.context_for_test(root);

                let a: Arc<dyn Question> = Arc::new(EchoQuestion::new("dep"));
                let b: Arc<dyn Question> = Arc::new(EchoQuestion::new("dep"));
                let answers = ctx.need(vec![a, b]).await.unwrap();

                assert_eq!(answers.len(), 2);
                let first = answers[0].clone().unwrap();
                let second = answers[1].clone().unwrap();
                assert!(Arc::ptr_eq(&first, &second));
            })
            .await;
    }

    #[tokio::test]
    async fn self_need_is_a_cycle() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let engine = Engine::new(Arc::new(MemoryDatabase::new()), kind_set()).build(Arc::new(LeafDispatcher));
                let root = Arc::new(EchoQuestion::new("root"));
                let ctx = engine.context_for_test(root.clone());

                let self_q: Arc<dyn Question> = root;
                let result = ctx.need(vec![self_q]).await;
                assert!(matches!(result, Err(BError::Cycle(_))));
            })
            .await;
    }
}
