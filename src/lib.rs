//! `bbuild` - an incremental, dependency-discovering build engine kernel.
//!
//! Users register [`Question`]/[`Answer`] kinds in a [`registry::KindSet`]
//! and a [`dispatcher::Dispatcher`] that knows how to turn a question into
//! an answer, possibly declaring further questions it `need`s along the way
//! via [`context::AnswerContext::need`]. The [`engine::Engine`] drains a
//! [`queue::QuestionQueue`], memoizes answers and their dependency sets in a
//! [`database::Database`], and re-dispatches only the subtrees whose
//! transitive inputs changed since the last run.
//!
//! See `demos/join_files.rs` for a worked example.

pub mod codec;
pub mod config;
pub mod context;
pub mod database;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod process;
pub mod question;
pub mod queue;
pub mod registry;

pub use context::AnswerContext;
pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use error::{BError, Result};
pub use fingerprint::Fingerprint;
pub use question::{Answer, Question};
pub use registry::{KindSet, QuestionKind};
