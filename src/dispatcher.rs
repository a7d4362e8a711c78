//! The user-supplied dispatcher (spec.md §6, "Dispatcher contract").
//!
//! "The user provides one callable `dispatch(ctx)`." A single `Dispatcher`
//! is registered with the engine; it pattern-matches on the question's kind
//! UUID to decide whether to `ctx.need(...)` further questions before
//! resolving, exactly the "tagged unions + match" indirection spec.md §9
//! sanctions as an alternative to per-kind operation tables.
//!
//! `dispatch` must call exactly one of `ctx.succeed()` / `ctx.succeed_answer`
//! before returning `Ok(())`; returning `Err` is equivalent to spec.md
//! §4.5.3's `ctx.fail(e)` and is the idiomatic way to propagate a failed
//! `need` with `?` instead of an explicit fail call.

use async_trait::async_trait;

use crate::context::AnswerContext;
use crate::error::BError;

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, ctx: &AnswerContext) -> Result<(), BError>;
}

/// A dispatcher for question kinds whose answer is entirely `query_answer` -
/// no `need` calls. Registering this is equivalent to every leaf question
/// kind calling `ctx.succeed()` immediately.
pub struct LeafDispatcher;

#[async_trait]
impl Dispatcher for LeafDispatcher {
    async fn dispatch(&self, ctx: &AnswerContext) -> Result<(), BError> {
        ctx.succeed().await
    }
}
