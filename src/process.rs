//! Child-process supervisor (spec.md §4.6).
//!
//! `tokio::process::Child::wait()` is the portable stand-in for the
//! kernel-event-filter/SIGCHLD-self-pipe duality spec.md §4.6 describes:
//! the tokio runtime's reactor already does the OS-specific reaping (via a
//! `SIGCHLD` handler on unix, a wait-handle reaper on windows) and resolves
//! one future per spawn exactly once, which is the only externally
//! observable contract spec.md asks for. Grounded on the teacher's
//! `tokio::process::Command` usage in `domain_ops/agent_ops.rs`.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::BError;

/// Tagged exit status (spec.md §4.6). `Exception` has no portable source on
/// the platforms tokio targets and is retained only so the type matches the
/// spec's three-way union; this implementation never constructs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(i64),
    Signal(i32),
    Exception(u32),
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    /// Converts a non-success status into the `BError` variant spec.md §7
    /// assigns it. Left to the dispatcher to call - the supervisor itself
    /// never fails a dispatch on a non-zero exit (spec.md: "Surface as
    /// dispatcher error; dispatcher decides").
    pub fn into_result(self) -> Result<(), BError> {
        match self {
            ExitStatus::Code(0) => Ok(()),
            ExitStatus::Code(code) => Err(BError::ChildNonZero(code)),
            ExitStatus::Signal(sig) => Err(BError::ChildSignal(sig)),
            ExitStatus::Exception(code) => Err(BError::ChildNonZero(code as i64)),
        }
    }
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Spawns `argv` (first element is the executable) and resolves once
    /// the child exits. Environment is inherited from this process unless
    /// the caller overrides it via `argv`'s caller-side construction (spec.md
    /// §6 leaves env overrides out of the core contract).
    async fn run(&self, argv: &[String]) -> Result<ExitStatus, BError>;
}

/// Default supervisor: spawns via `tokio::process::Command` and awaits
/// `Child::wait()`. The main loop holds exactly one of these; dropping it at
/// shutdown does not leave children zombie because every spawned child is
/// already being awaited by an in-flight dispatch task (spec.md §4.6,
/// "never left zombie once the loop shuts down cleanly").
pub struct TokioProcessSupervisor {
    /// spec.md §6: "Environment is inherited from the loop's process unless
    /// the dispatcher specifies otherwise (optional extension...)". This is
    /// the one on/off switch the core spec allows, sourced from
    /// [`crate::config::EngineConfig::inherit_environment`].
    inherit_environment: bool,
}

impl TokioProcessSupervisor {
    pub fn new() -> Self {
        Self {
            inherit_environment: true,
        }
    }

    pub fn with_inherit_environment(inherit_environment: bool) -> Self {
        Self { inherit_environment }
    }
}

impl Default for TokioProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSupervisor for TokioProcessSupervisor {
    async fn run(&self, argv: &[String]) -> Result<ExitStatus, BError> {
        let Some((program, args)) = argv.split_first() else {
            return Err(BError::DispatchFail("empty argv passed to process supervisor".into()));
        };

        debug!(?argv, inherit_environment = self.inherit_environment, "spawning child process");
        let mut command = Command::new(program);
        command.args(args);
        if !self.inherit_environment {
            command.env_clear();
        }
        let mut child = command
            .spawn()
            .map_err(|e| BError::DispatchFail(format!("spawn {program:?} failed: {e}")))?;

        let status = child
            .wait()
            .await
            .map_err(|e| BError::DispatchFail(format!("wait on {program:?} failed: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                warn!(?argv, signal, "child terminated by signal");
                return Ok(ExitStatus::Signal(signal));
            }
        }

        let code = status.code().unwrap_or(-1) as i64;
        Ok(ExitStatus::Code(code))
    }
}
