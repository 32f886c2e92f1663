//! CLI argument parsing using clap derive API
//!
//! Purely declarative; no side effects.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// virtrun -- run virtualization test jobs.
///
/// Use `virtrun <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "virtrun", version, about, long_about = None)]
pub struct Cli {
    /// Path to the virtrun.toml configuration file.
    #[arg(short, long, default_value = "virtrun.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every test of a job file in order.
    Run(RunArgs),

    /// Destroy a persisted environment left behind by an earlier job.
    Cleanup(CleanupArgs),
}

// ---- run ----

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job file with one `[[tests]]` table per test.
    pub job: PathBuf,

    /// Override `job.results_dir`.
    #[arg(long)]
    pub results_dir: Option<PathBuf>,
}

// ---- cleanup ----

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Environment name (file below `env.tmp_dir`).
    #[arg(default_value = "env")]
    pub env: String,
}
