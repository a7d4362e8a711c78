//! `cargo run --example join_files -- one.txt two.txt three.txt -o joined.txt`
//!
//! Builds `joined.txt` by concatenating its inputs, caching in an in-memory
//! database for the lifetime of the process. Run it twice against the same
//! `SqliteDatabase` file to see spec.md §8 scenario 1 (unchanged inputs -> no
//! re-join) and edit an input between runs to see scenario 2 (changed input
//! -> re-join only the join, not untouched files).

#[path = "join_files_support.rs"]
mod support;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use bbuild::database::sqlite::SqliteDatabase;
use bbuild::Engine;

use support::{kind_set, JoinFilesDispatcher, JoinQuestion};

#[derive(Parser)]
#[command(name = "join_files", about = "Join several files into one, incrementally")]
struct Args {
    /// Input files, joined in the order given.
    inputs: Vec<String>,

    /// Output file path.
    #[arg(short, long, default_value = "joined.txt")]
    output: String,

    /// SQLite cache file (defaults to an in-memory cache, so consecutive
    /// invocations of this process never hit each other's cache - pass a
    /// real path to observe caching across runs).
    #[arg(long)]
    cache: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::try_init().ok();

    let args = Args::parse();
    let inputs = if args.inputs.is_empty() {
        vec!["one.txt".to_string(), "two.txt".to_string(), "three.txt".to_string()]
    } else {
        args.inputs
    };

    let database: Arc<dyn bbuild::database::Database> = match &args.cache {
        Some(path) => match SqliteDatabase::connect(path)
            .await
            .with_context(|| format!("opening cache {path}"))
        {
            Ok(db) => Arc::new(db),
            Err(e) => {
                eprintln!("{e:#}");
                return ExitCode::from(2);
            }
        },
        None => Arc::new(bbuild::database::memory::MemoryDatabase::new()),
    };

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            let started = chrono::Utc::now();
            let engine = Engine::new(database, kind_set()).build(Arc::new(JoinFilesDispatcher));
            let root: Arc<dyn bbuild::Question> = Arc::new(JoinQuestion::new(args.output.clone(), inputs));

            match engine.run(root).await {
                Ok(_) => {
                    let elapsed = chrono::Utc::now() - started;
                    println!("built {} in {}ms", args.output, elapsed.num_milliseconds());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("build failed: {e}");
                    ExitCode::from(2)
                }
            }
        })
        .await
}
