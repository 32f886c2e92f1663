//! Job files and sequential job execution
//!
//! A job file lists tests in run order:
//!
//! ```toml
//! [[tests]]
//! name = "boot"
//! params = { type = "shell", shell_cmd = "true", env_cleanup = "no" }
//!
//! [[tests]]
//! name = "reboot"
//! depends_on = ["boot"]
//! params = { type = "shell", shell_cmd = "true" }
//! ```
//!
//! [`JobRunner`] feeds each test through one [`ExecutionPipeline`], all
//! sharing one [`ExitFunctionRegistry`]. Job-level exit functions run once
//! after the last test.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use virtrun_core::exit_fn::JOB_EXIT_KEY;
use virtrun_core::metrics as m;
use virtrun_core::params::KEY_DEPENDENCY_FAILED;
use virtrun_core::{ExecutionPipeline, ExitFunctionRegistry, Params, PipelineOutcome, TestContext};

use crate::error::CliError;

// ─── Job file ────────────────────────────────────────────────────────

/// Parsed job file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFile {
    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

/// One `[[tests]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEntry {
    pub name: String,
    /// Tests that must pass (or warn) before this one runs.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub params: toml::Table,
}

impl JobFile {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CliError::Job(format!("cannot read job file '{}': {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse and check a job file.
    ///
    /// Names must be unique and non-empty, and every dependency must name an
    /// earlier test.
    pub fn parse(toml_str: &str) -> Result<Self, CliError> {
        let job: Self = toml::from_str(toml_str)
            .map_err(|e| CliError::Job(format!("invalid job file: {e}")))?;

        let mut seen = HashSet::new();
        for test in &job.tests {
            if test.name.trim().is_empty() {
                return Err(CliError::Job("test name must not be empty".to_owned()));
            }
            for dep in &test.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(CliError::Job(format!(
                        "test '{}' depends on '{}', which is not an earlier test",
                        test.name, dep
                    )));
                }
            }
            if !seen.insert(test.name.as_str()) {
                return Err(CliError::Job(format!("duplicate test name '{}'", test.name)));
            }
        }

        Ok(job)
    }
}

// ─── Summary ─────────────────────────────────────────────────────────

/// Outcome of one test in a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestRecord {
    pub name: String,
    pub outcome: PipelineOutcome,
}

/// Result of a whole job run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobSummary {
    pub tests: Vec<TestRecord>,
    /// Tests never started because the job stopped early.
    pub not_run: Vec<String>,
    /// Combined failures of the job-level exit functions.
    pub exit_errors: Option<String>,
}

impl JobSummary {
    pub fn outcome_of(&self, name: &str) -> Option<&PipelineOutcome> {
        self.tests.iter().find(|r| r.name == name).map(|r| &r.outcome)
    }

    pub fn failed(&self) -> usize {
        self.tests.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn total(&self) -> usize {
        self.tests.len() + self.not_run.len()
    }

    /// `true` when no test failed, errored or aborted.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// `Ok` on success, [`CliError::TestsFailed`] otherwise.
    pub fn into_result(self) -> Result<Self, CliError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CliError::TestsFailed {
                failed: self.failed(),
                total: self.total(),
            })
        }
    }
}

// ─── JobRunner ───────────────────────────────────────────────────────

/// Runs the tests of a job one after another.
pub struct JobRunner {
    pipeline: ExecutionPipeline,
    results_dir: PathBuf,
    exit_functions: ExitFunctionRegistry,
}

impl JobRunner {
    pub fn new(pipeline: ExecutionPipeline, results_dir: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            results_dir: results_dir.into(),
            exit_functions: ExitFunctionRegistry::new(),
        }
    }

    pub fn exit_functions(&self) -> &ExitFunctionRegistry {
        &self.exit_functions
    }

    /// Run every test in order.
    ///
    /// An aborted test ends the job; the remaining tests are listed as not
    /// run. Job-level exit functions run in either case.
    pub async fn run(&self, job: &JobFile) -> JobSummary {
        let mut summary = JobSummary::default();
        let mut outcomes: HashMap<&str, PipelineOutcome> = HashMap::new();

        info!(tests = job.tests.len(), results = %self.results_dir.display(), "starting job");

        for (index, entry) in job.tests.iter().enumerate() {
            let outcome = self.run_one(entry, &outcomes).await;
            let aborted = matches!(outcome, PipelineOutcome::Aborted(_));

            outcomes.insert(entry.name.as_str(), outcome.clone());
            summary.tests.push(TestRecord {
                name: entry.name.clone(),
                outcome,
            });

            if aborted {
                summary.not_run = job.tests[index + 1..].iter().map(|t| t.name.clone()).collect();
                warn!(
                    test = %entry.name,
                    remaining = summary.not_run.len(),
                    "job aborted, remaining tests will not run"
                );
                metrics::counter!(m::JOB_TESTS_NOT_RUN_TOTAL).increment(summary.not_run.len() as u64);
                break;
            }
        }

        if let Some(errors) = self.exit_functions.run_exit_functions(JOB_EXIT_KEY) {
            warn!(errors = %errors, "job exit functions failed");
            summary.exit_errors = Some(errors);
        }

        info!(
            total = summary.total(),
            failed = summary.failed(),
            not_run = summary.not_run.len(),
            "job finished"
        );
        summary
    }

    async fn run_one(&self, entry: &TestEntry, outcomes: &HashMap<&str, PipelineOutcome>) -> PipelineOutcome {
        let mut params = match Params::from_table(&entry.params) {
            Ok(params) => params,
            Err(e) => {
                warn!(test = %entry.name, error = %e, "invalid test parameters");
                return PipelineOutcome::Errored(e.to_string());
            }
        };

        let blocked = entry
            .depends_on
            .iter()
            .any(|dep| !outcomes.get(dep.as_str()).is_some_and(PipelineOutcome::is_pass));
        if blocked {
            params.set(KEY_DEPENDENCY_FAILED, "yes");
        }

        let logdir = self.results_dir.join(&entry.name);
        if let Err(e) = tokio::fs::create_dir_all(&logdir).await {
            warn!(test = %entry.name, path = %logdir.display(), error = %e, "cannot create log directory");
        }

        let ctx = TestContext::new(entry.name.as_str(), logdir)
            .with_exit_functions(self.exit_functions.clone());
        self.pipeline.run_outcome(&ctx, &mut params).await
    }
}
