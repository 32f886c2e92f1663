//! Built-in `shell` test type
//!
//! Runs `shell_cmd` through `sh -c` in the test's log directory. The
//! combined output is written to `shell.log` there. A non-zero exit is a
//! test failure; exceeding `shell_timeout` seconds is an error and the
//! child is killed.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};

use virtrun_core::{Environment, Params, TestContext, TestError, TestRunner};

/// Type name the runner is registered under.
pub const SHELL_TYPE: &str = "shell";

pub const KEY_SHELL_CMD: &str = "shell_cmd";
pub const KEY_SHELL_TIMEOUT: &str = "shell_timeout";

/// Seconds a command may run when `shell_timeout` is not set.
pub const DEFAULT_SHELL_TIMEOUT_SECS: u64 = 600;

/// Log file written below the test's log directory.
pub const SHELL_LOG_FILE: &str = "shell.log";

/// Environment key holding the last exit code (`null` when killed by a signal).
pub const ENV_EXIT_STATUS: &str = "shell_exit_status";

/// [`TestRunner`] for shell commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellTest;

impl ShellTest {
    pub fn new() -> Self {
        Self
    }
}

impl TestRunner for ShellTest {
    async fn run(
        &self,
        ctx: &TestContext,
        params: &Params,
        env: &mut Environment,
    ) -> Result<(), TestError> {
        let cmd = params
            .get(KEY_SHELL_CMD)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| TestError::error("Parameter 'shell_cmd' is required by the shell test type"))?;
        let timeout_secs = shell_timeout(params)?;

        info!(test = ctx.name(), command = cmd, timeout_secs, "running shell command");
        let start = Instant::now();

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if ctx.logdir().is_dir() {
            command.current_dir(ctx.logdir());
        }

        let child = command
            .spawn()
            .map_err(|e| TestError::error(format!("Failed to start '{cmd}': {e}")))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => {
                result.map_err(|e| TestError::error(format!("Failed to wait for '{cmd}': {e}")))?
            }
            Err(_) => {
                return Err(TestError::error(format!(
                    "Command '{cmd}' timed out after {timeout_secs} seconds"
                )));
            }
        };

        debug!(
            test = ctx.name(),
            status = %output.status,
            duration_ms = start.elapsed().as_millis() as u64,
            "shell command finished"
        );
        write_log(ctx.logdir(), cmd, &output).await;
        env.insert_value(ENV_EXIT_STATUS, serde_json::json!(output.status.code()));

        if output.status.success() {
            Ok(())
        } else {
            Err(TestError::fail(format!(
                "Command '{cmd}' failed ({})",
                output.status
            )))
        }
    }
}

fn shell_timeout(params: &Params) -> Result<u64, TestError> {
    match params.get(KEY_SHELL_TIMEOUT) {
        None => Ok(DEFAULT_SHELL_TIMEOUT_SECS),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(secs),
            _ => Err(TestError::error(format!(
                "Invalid shell_timeout '{raw}', expected a positive number of seconds"
            ))),
        },
    }
}

async fn write_log(logdir: &Path, cmd: &str, output: &Output) {
    let body = format!(
        "$ {cmd}\n--- stdout ---\n{}\n--- stderr ---\n{}\n--- {} ---\n",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
        output.status,
    );

    let path = logdir.join(SHELL_LOG_FILE);
    let result = async {
        tokio::fs::create_dir_all(logdir).await?;
        tokio::fs::write(&path, body).await
    }
    .await;

    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "failed to write shell log");
    }
}
