//! Question queue (spec.md §4.4).
//!
//! A FIFO of pending dispatch items. `enqueue` never blocks and wakes any
//! task parked in [`QuestionQueue::dequeue_or_wait`]. This is the
//! "self-signaled" variant of spec.md §4.4 - the single OS thread that owns
//! the [`crate::engine::Engine`] main loop polls the queue directly rather
//! than through a kernel event source, since that is the only variant a
//! portable `tokio::task::LocalSet` loop needs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};
use uuid::Uuid;

use crate::error::BError;
use crate::fingerprint::Fingerprint;
use crate::question::{Answer, Question};

/// One pending dispatch, carrying everything `dispatch_one` needs (spec.md
/// §4.4: `{question, kind, answer_callback}`).
pub struct QueueItem {
    pub question: Arc<dyn Question>,
    pub kind_uuid: Uuid,
    pub answer_callback: oneshot::Sender<Option<Arc<dyn Answer>>>,
    /// Fingerprints of the contexts that caused this item to be enqueued,
    /// root-most first. Used by `need` to detect a question depending on
    /// itself (spec.md §4.5.4) before it ever reaches the queue.
    pub ancestors: Arc<Vec<Fingerprint>>,
}

#[derive(Default)]
struct Inner {
    items: VecDeque<QueueItem>,
}

/// FIFO described by spec.md §4.4. Enqueue is reentrant-safe (a plain
/// `std::sync::Mutex` is sufficient here since no critical section ever
/// awaits); dequeue is single-consumer, driven by the main loop.
pub struct QuestionQueue {
    inner: std::sync::Mutex<Inner>,
    closed: AtomicBool,
    notify: Notify,
}

impl QuestionQueue {
    pub fn new() -> Self {
        Self {
            inner: std::sync::Mutex::new(Inner::default()),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Never blocks. Fails with `QueueClosed` once `close` has been called.
    pub fn enqueue(&self, item: QueueItem) -> Result<(), BError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BError::QueueClosed);
        }
        self.inner.lock().expect("queue mutex poisoned").items.push_back(item);
        self.notify.notify_one();
        Ok(())
    }

    /// Non-blocking. Returns `(item, closed)`; `closed` is true only once the
    /// queue has been closed *and* drained.
    pub fn try_dequeue(&self) -> (Option<QueueItem>, bool) {
        let mut guard = self.inner.lock().expect("queue mutex poisoned");
        let item = guard.items.pop_front();
        let closed = item.is_none() && self.closed.load(Ordering::Acquire);
        (item, closed)
    }

    /// Marks the queue closed. `try_dequeue` continues to drain whatever was
    /// already enqueued; it only reports `closed=true` once that drains to
    /// empty (spec.md §4.4: "All items must be drained before close()
    /// returns").
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Dequeues the next item, parking on `notify` when the queue is
    /// momentarily empty but not yet closed. Returns `None` once closed and
    /// drained.
    pub async fn dequeue_or_wait(&self) -> Option<QueueItem> {
        loop {
            let (item, closed) = self.try_dequeue();
            if let Some(item) = item {
                return Some(item);
            }
            if closed {
                return None;
            }
            self.notify.notified().await;
        }
    }
}

impl Default for QuestionQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::test_support::EchoQuestion;

    fn item(payload: &str) -> (QueueItem, oneshot::Receiver<Option<Arc<dyn Answer>>>) {
        let q: Arc<dyn Question> = Arc::new(EchoQuestion::new(payload));
        let kind_uuid = q.kind_uuid();
        let (tx, rx) = oneshot::channel();
        (
            QueueItem {
                question: q,
                kind_uuid,
                answer_callback: tx,
                ancestors: Arc::new(Vec::new()),
            },
            rx,
        )
    }

    #[test]
    fn fifo_order_preserved() {
        let queue = QuestionQueue::new();
        let (a, _ra) = item("a");
        let (b, _rb) = item("b");
        queue.enqueue(a).unwrap();
        queue.enqueue(b).unwrap();

        let (first, _) = queue.try_dequeue();
        assert_eq!(first.unwrap().question.kind_uuid(), EchoQuestion::new("a").kind_uuid());
        let (second, _) = queue.try_dequeue();
        assert!(second.is_some());
    }

    #[test]
    fn enqueue_after_close_fails() {
        let queue = QuestionQueue::new();
        queue.close();
        let (a, _ra) = item("a");
        assert!(matches!(queue.enqueue(a), Err(BError::QueueClosed)));
    }

    #[test]
    fn not_closed_until_drained() {
        let queue = QuestionQueue::new();
        let (a, _ra) = item("a");
        queue.enqueue(a).unwrap();
        queue.close();

        let (item, closed) = queue.try_dequeue();
        assert!(item.is_some());
        assert!(!closed);

        let (item, closed) = queue.try_dequeue();
        assert!(item.is_none());
        assert!(closed);
    }

    #[tokio::test]
    async fn dequeue_or_wait_wakes_on_enqueue() {
        let queue = Arc::new(QuestionQueue::new());
        let waiter_queue = queue.clone();
        let waiter = tokio::spawn(async move { waiter_queue.dequeue_or_wait().await });

        tokio::task::yield_now().await;
        let (a, _ra) = item("a");
        queue.enqueue(a).unwrap();

        let got = waiter.await.unwrap();
        assert!(got.is_some());
    }
}
