//! Subcommand handlers

use std::fmt::Write as _;

use tracing::info;

use virtrun_core::{
    EnvironmentStore, ExecutionPipeline, FileEnvStore, RunnerConfig, TestTypeRegistry, VirtrunError,
};

use crate::cli::{CleanupArgs, Cli, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::job::{JobFile, JobRunner, JobSummary};
use crate::shell::{SHELL_TYPE, ShellTest};

/// Resolve the effective configuration.
///
/// A missing config file is not an error; defaults plus `VIRTRUN_*`
/// overrides are used instead. Command line flags win over both.
pub async fn load_config(cli: &Cli) -> Result<RunnerConfig, CliError> {
    let mut config = if cli.config.exists() {
        RunnerConfig::load(&cli.config)
            .await
            .map_err(|e| CliError::Config(e.to_string()))?
    } else {
        let mut config = RunnerConfig::default();
        config.apply_env_overrides();
        config
    };

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }

    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}

/// Pipeline with the built-in test types registered.
pub fn build_pipeline(config: &RunnerConfig) -> Result<ExecutionPipeline, CliError> {
    let mut registry = TestTypeRegistry::new();
    registry
        .register(SHELL_TYPE, Box::new(ShellTest::new()))
        .map_err(VirtrunError::from)?;

    ExecutionPipeline::builder()
        .registry(registry)
        .env_dir(config.env.tmp_dir.clone())
        .env_version(config.env.version)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))
}

// ---- run ----

pub async fn run_job(
    config: &RunnerConfig,
    args: &RunArgs,
    output: OutputFormat,
) -> Result<(), CliError> {
    let job = JobFile::load(&args.job).await?;
    let results_dir = args
        .results_dir
        .clone()
        .unwrap_or_else(|| config.job.results_dir.clone());

    let runner = JobRunner::new(build_pipeline(config)?, results_dir);
    let summary = runner.run(&job).await;

    match output {
        OutputFormat::Text => print!("{}", render_text(&summary)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    summary.into_result().map(|_| ())
}

/// Human-readable summary table.
pub fn render_text(summary: &JobSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<30} {:<8} REASON", "TEST", "STATUS");
    let _ = writeln!(out, "{}", "-".repeat(72));

    for record in &summary.tests {
        let _ = writeln!(
            out,
            "{:<30} {:<8} {}",
            record.name,
            record.outcome.label().to_uppercase(),
            record.outcome.reason().unwrap_or("")
        );
    }
    for name in &summary.not_run {
        let _ = writeln!(out, "{:<30} {:<8}", name, "NOT RUN");
    }
    if let Some(errors) = &summary.exit_errors {
        let _ = writeln!(out, "\njob exit functions failed:\n{errors}");
    }

    let _ = writeln!(
        out,
        "\n{} tests, {} failed, {} not run",
        summary.total(),
        summary.failed(),
        summary.not_run.len()
    );
    out
}

// ---- cleanup ----

pub fn cleanup(
    config: &RunnerConfig,
    args: &CleanupArgs,
    output: OutputFormat,
) -> Result<(), CliError> {
    let path = config.env.tmp_dir.join(&args.env);
    let existed = path.exists();

    let store = FileEnvStore::new();
    let mut env = store.load(&path, config.env.version);
    let entries = env.len();
    store.destroy(&mut env);
    info!(path = %path.display(), entries, existed, "environment cleaned up");

    match output {
        OutputFormat::Text if existed => {
            println!("Destroyed environment {} ({} entries)", path.display(), entries)
        }
        OutputFormat::Text => println!("No environment at {}", path.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "path": path.display().to_string(),
                "existed": existed,
                "entries": entries,
            }))?
        ),
    }

    Ok(())
}
