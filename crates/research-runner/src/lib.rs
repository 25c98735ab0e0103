//! # Research Runner
//!
//! Command-line surface and pipeline wiring. Every command is a thin
//! wrapper over the core crates; exit codes are distinct for gate failures:
//! `0` success, `2` BLOCKED, `3` INVALIDATED, `4` ERROR, `1` other failure.

pub mod commands;
pub mod pipeline;
pub mod sim;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use pipeline::StageOutcome;

#[derive(Parser, Debug)]
#[command(name = "research-kit")]
#[command(about = "Strategy discovery and validation pipeline")]
#[command(version)]
pub struct Cli {
    /// Workspace path (default: $RESEARCH_WORKSPACE or ./research-workspace)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a workspace (directories, default config)
    Init,

    /// Ingest drafts from the inbox (or one file)
    Ingest {
        /// Specific draft file; defaults to every file in the inbox
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Run verification checks on a strategy
    Verify {
        id: String,

        /// Anchor year for the walk-forward history window
        #[arg(long)]
        anchor_year: Option<i32>,
    },

    /// Generate the backtest artifact for a strategy
    Generate { id: String },

    /// Run walk-forward validation (verify + generate must have passed)
    Validate {
        id: String,

        /// Anchor year for window slicing (default: last complete year)
        #[arg(long)]
        anchor_year: Option<i32>,

        /// Bootstrap / backend seed
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Append a new validation record even when one exists for this
        /// definition (out-of-sample is one-shot by default)
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Extract deterministic learnings from the latest validation
    Learn { id: String },

    /// Run the persona panel and synthesizer over the latest validation
    Synthesize { id: String },

    /// Run ideation personas and file accepted ideas
    Ideate,

    /// List strategies, optionally filtered by state
    List {
        #[arg(long)]
        state: Option<String>,
    },

    /// Show one record (strategy, idea, or proposal)
    Show { id: String },

    /// Workspace status summary
    Status,

    /// Approve a record: tier-3 review (STRAT-), idea (IDEA-), or
    /// proposal (PROP-)
    Approve {
        id: String,

        /// Decision for proposals: approve, reject, or defer
        #[arg(long, default_value = "approve")]
        decision: String,

        /// Review note recorded with the transition
        #[arg(long, default_value = "")]
        note: String,
    },
}

/// Binary entry point: parse, run, exit with the stage's code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return 1;
        }
    };
    runtime.block_on(commands::dispatch(cli))
}
