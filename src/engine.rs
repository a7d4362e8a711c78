//! Main loop (spec.md §4.7) and the shared state every `AnswerContext`
//! dispatches through.
//!
//! Translated from the source's hand-rolled generator/trampoline (spec.md
//! §9, "Cooperative scheduling") into native `async`/`await`: each queue
//! item becomes a `tokio::task::spawn_local` task on a single
//! `tokio::task::LocalSet`, so the whole engine still runs on one OS thread
//! (spec.md §5, "single-threaded cooperative") while `need` suspends on a
//! `oneshot::Receiver` instead of a bespoke awaitable.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::codec::{BufferSource, DEFAULT_MAX_LEN_PREFIX};
use crate::context::AnswerContext;
use crate::database::Database;
use crate::dispatcher::Dispatcher;
use crate::error::BError;
use crate::fingerprint::Fingerprint;
use crate::process::{ProcessSupervisor, TokioProcessSupervisor};
use crate::question::{Answer, Question};
use crate::queue::{QueueItem, QuestionQueue};
use crate::registry::KindSet;

type Waiters = Vec<oneshot::Sender<Option<Arc<dyn Answer>>>>;

/// State shared by every `AnswerContext` and by the main loop itself. Kept
/// separate from `Engine` so `AnswerContext` can hold an `Arc<EngineShared>`
/// without holding the `Dispatcher`/`ProcessSupervisor` trait objects'
/// construction-time generics.
pub struct EngineShared {
    pub(crate) database: Arc<dyn Database>,
    pub(crate) registry: KindSet,
    pub(crate) queue: QuestionQueue,
    pub(crate) supervisor: Arc<dyn ProcessSupervisor>,
    /// Ceiling on a single length-prefixed codec read when decoding a
    /// cached answer (spec.md §4.1, `CodecOverflow`), from
    /// [`crate::config::EngineConfig::max_len_prefix`].
    max_len_prefix: u64,
    in_flight: std::sync::Mutex<HashMap<Fingerprint, Waiters>>,
    /// First fatal error observed by any dispatch (spec.md §7, `StoreIO` is
    /// fatal). Set at most once; short-circuits the run's exit code even if
    /// the root question happens to still resolve successfully.
    fatal: std::sync::Mutex<Option<BError>>,
}

impl EngineShared {
    /// spec.md §4.5.1: always goes through the queue, even when the
    /// dependency's fingerprint is already in flight - `dispatch_one`
    /// de-duplicates at dequeue time (spec.md §4.5.4), not here.
    pub(crate) async fn enqueue_need(
        &self,
        question: Arc<dyn Question>,
        ancestors: Arc<Vec<Fingerprint>>,
    ) -> Result<oneshot::Receiver<Option<Arc<dyn Answer>>>, BError> {
        let (tx, rx) = oneshot::channel();
        let kind_uuid = question.kind_uuid();
        self.queue.enqueue(QueueItem {
            question,
            kind_uuid,
            answer_callback: tx,
            ancestors,
        })?;
        Ok(rx)
    }

    /// Notifies every waiter attached to `fingerprint` and forgets the
    /// in-flight entry. Called exactly once per fingerprint, from the
    /// context that owns its dispatch (spec.md §4.5, terminal transitions).
    pub(crate) async fn resolve(&self, fingerprint: &Fingerprint, answer: Option<Arc<dyn Answer>>) {
        let waiters = {
            let mut in_flight = self.in_flight.lock().expect("in_flight mutex poisoned");
            in_flight.remove(fingerprint).unwrap_or_default()
        };
        for tx in waiters {
            let _ = tx.send(answer.clone());
        }
    }

    fn note_fatal(&self, e: BError) {
        let mut fatal = self.fatal.lock().expect("fatal mutex poisoned");
        if fatal.is_none() {
            error!(error = %e, "fatal engine error, closing queue");
            *fatal = Some(e);
        }
        self.queue.close();
    }
}

/// The build engine: owns the database, registry, queue, dispatcher and
/// process supervisor for one run (spec.md §9, "Global state" - these are
/// per-run values, never process-wide singletons).
pub struct Engine {
    shared: Arc<EngineShared>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl Engine {
    pub fn new(database: Arc<dyn Database>, registry: KindSet) -> EngineBuilder {
        EngineBuilder {
            database,
            registry,
            supervisor: Arc::new(TokioProcessSupervisor::new()),
            max_len_prefix: DEFAULT_MAX_LEN_PREFIX,
        }
    }

    /// Runs `recheck_all` (spec.md §4.3), then dispatches `root` to
    /// completion. Returns the root's answer, or the failure that caused
    /// exit code 2 (spec.md §6).
    pub async fn run(self: Arc<Self>, root: Arc<dyn Question>) -> Result<Arc<dyn Answer>, BError> {
        self.shared
            .database
            .recheck_all(&self.shared.registry, self.shared.max_len_prefix)
            .await?;

        let root_fp = Fingerprint::of(&*root);
        let (root_tx, root_rx) = oneshot::channel();
        self.shared.queue.enqueue(QueueItem {
            kind_uuid: root.kind_uuid(),
            question: root,
            answer_callback: root_tx,
            ancestors: Arc::new(Vec::new()),
        })?;

        let drain_shared = self.shared.clone();
        let drain_dispatcher = self.dispatcher.clone();
        let drain = tokio::task::spawn_local(async move {
            let mut tasks = JoinSet::new();
            while let Some(item) = drain_shared.queue.dequeue_or_wait().await {
                let shared = drain_shared.clone();
                let dispatcher = drain_dispatcher.clone();
                tasks.spawn_local(async move { dispatch_one(shared, dispatcher, item).await });
            }
            while tasks.join_next().await.is_some() {}
        });

        let answer = root_rx.await.unwrap_or(None);
        self.shared.queue.close();
        drain.await.expect("drain task panicked");

        if let Some(fatal) = self.shared.fatal.lock().expect("fatal mutex poisoned").take() {
            return Err(fatal);
        }

        answer.ok_or_else(|| BError::DispatchFail(format!("root question {root_fp:?} failed")))
    }

    #[cfg(test)]
    pub(crate) fn context_for_test(&self, question: Arc<dyn Question>) -> AnswerContext {
        let fp = Fingerprint::of(&*question);
        AnswerContext::new(self.shared.clone(), fp, question, Arc::new(Vec::new()))
    }
}

pub struct EngineBuilder {
    database: Arc<dyn Database>,
    registry: KindSet,
    supervisor: Arc<dyn ProcessSupervisor>,
    max_len_prefix: u64,
}

impl EngineBuilder {
    pub fn with_supervisor(mut self, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_max_len_prefix(mut self, max_len_prefix: u64) -> Self {
        self.max_len_prefix = max_len_prefix;
        self
    }

    pub fn build(self, dispatcher: Arc<dyn Dispatcher>) -> Arc<Engine> {
        Arc::new(Engine {
            shared: Arc::new(EngineShared {
                database: self.database,
                registry: self.registry,
                queue: QuestionQueue::new(),
                supervisor: self.supervisor,
                max_len_prefix: self.max_len_prefix,
                in_flight: std::sync::Mutex::new(HashMap::new()),
                fatal: std::sync::Mutex::new(None),
            }),
            dispatcher,
        })
    }
}

/// spec.md §4.7.1 `dispatch_one`, run as one spawned task per queue item.
async fn dispatch_one(shared: Arc<EngineShared>, dispatcher: Arc<dyn Dispatcher>, item: QueueItem) {
    let fp = Fingerprint::of(&*item.question);

    {
        let mut in_flight = shared.in_flight.lock().expect("in_flight mutex poisoned");
        if let Some(waiters) = in_flight.get_mut(&fp) {
            waiters.push(item.answer_callback);
            return;
        }
        in_flight.insert(fp.clone(), vec![item.answer_callback]);
    }

    match try_cache_hit(&shared, &fp).await {
        Ok(Some(answer)) => {
            debug!(?fp, "cache hit, delivering without dispatch");
            shared.resolve(&fp, Some(answer)).await;
            return;
        }
        Ok(None) => {}
        Err(e) => {
            if e.is_fatal() {
                shared.note_fatal(e);
            } else {
                warn!(?fp, error = %e, "cache lookup failed, falling back to fresh dispatch");
            }
        }
    }

    let ctx = AnswerContext::new(shared.clone(), fp.clone(), item.question.clone(), item.ancestors.clone());
    match dispatcher.dispatch(&ctx).await {
        Ok(()) => {
            if !ctx.is_resolved().await {
                error!(?fp, "dispatcher returned without calling succeed/succeed_answer");
                ctx.fail().await;
            }
        }
        Err(e) => {
            if e.is_fatal() {
                shared.note_fatal(e);
            } else {
                debug!(?fp, error = %e, "dispatch failed");
            }
            ctx.fail().await;
        }
    }
}

/// Implements spec.md §4.7.1's cache-hit shortcut: a persisted answer is
/// trustworthy exactly when every dependency fingerprint it was recorded
/// with still has a persisted answer of its own. `recheck_all` having run
/// at startup (spec.md §4.3) is what makes "still persisted" equivalent to
/// "still reflects the current outside world" - no re-querying needed here.
async fn try_cache_hit(shared: &EngineShared, fp: &Fingerprint) -> Result<Option<Arc<dyn Answer>>, BError> {
    let Some(entry) = shared.database.get(fp).await? else {
        return Ok(None);
    };

    for dep in &entry.deps {
        if shared.database.get(dep).await?.is_none() {
            return Ok(None);
        }
    }

    let Some(kind_uuid) = fp.kind_uuid() else {
        return Ok(None);
    };
    let kind = match shared.registry.get(kind_uuid) {
        Ok(kind) => kind,
        Err(BError::KindUnknown { uuid }) => {
            warn!(%uuid, "cached fingerprint's kind is no longer registered");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let mut source = BufferSource::with_max_len_prefix(&entry.answer_bytes, shared.max_len_prefix);
    match (kind.deserialize_answer)(&mut source) {
        Ok(answer) => Ok(Some(answer)),
        Err(e) => {
            warn!(?fp, error = %e, "corrupt cached answer bytes");
            Ok(None)
        }
    }
}
