//! `b` - the engine's CLI entry point (spec.md §6/§9's restatement of
//! `main`, `b.py`'s role in the original).
//!
//! Loads [`bbuild::config::EngineConfig`], opens the SQLite database it
//! names, registers the bundled `join_files` demo kinds and dispatcher
//! (spec.md §1: the example builds are clients of the kernel, not part of
//! it - this binary is the thinnest possible client), and runs the engine to
//! completion against a root question built from the CLI's file arguments.
//! Exit codes follow spec.md §6 exactly: 0 success, 1 root still pending
//! (should not happen), 2 failure.

#[path = "../../demos/join_files_support.rs"]
mod join_files_support;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bbuild::config::EngineConfig;
use bbuild::database::sqlite::SqliteDatabase;
use bbuild::process::TokioProcessSupervisor;
use bbuild::{Engine, Question};

use join_files_support::{kind_set, JoinFilesDispatcher, JoinQuestion};

/// See module docs. The only build this binary knows how to drive is the
/// `join_files` demo; a real deployment of this kernel links its own
/// dispatcher and calls `bbuild::Engine` directly, the way
/// `demos/join_files.rs` does.
#[derive(Parser)]
#[command(name = "b", about = "Incremental, dependency-discovering build engine")]
struct Args {
    /// Output file to build.
    #[arg(short, long)]
    output: String,

    /// Input files, joined in the order given.
    inputs: Vec<String>,

    /// Path to a TOML config file overlaying the built-in defaults.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match EngineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::from(2);
        }
    };

    let database = match SqliteDatabase::connect(&config.database_path).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!(error = %e, path = %config.database_path, "failed to open database");
            return ExitCode::from(2);
        }
    };

    let local = tokio::task::LocalSet::new();
    local
        .run_until(run(database, args, config))
        .await
}

async fn run(database: Arc<SqliteDatabase>, args: Args, config: EngineConfig) -> ExitCode {
    let started = chrono::Utc::now();
    let engine = Engine::new(database, kind_set())
        .with_max_len_prefix(config.max_len_prefix)
        .with_supervisor(Arc::new(TokioProcessSupervisor::with_inherit_environment(
            config.inherit_environment,
        )))
        .build(Arc::new(JoinFilesDispatcher));
    let root: Arc<dyn Question> = Arc::new(JoinQuestion::new(args.output.clone(), args.inputs));

    match engine.run(root).await {
        Ok(_) => {
            let elapsed = chrono::Utc::now() - started;
            tracing::info!(output = %args.output, ms = elapsed.num_milliseconds(), "build succeeded");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "build failed");
            ExitCode::from(2)
        }
    }
}
