//! CLI-specific error types and exit code mapping

use virtrun_core::error::VirtrunError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// The job file could not be read or is inconsistent.
    #[error("job error: {0}")]
    Job(String),

    /// The job ran but at least one test did not succeed.
    #[error("{failed} of {total} tests failed")]
    TestsFailed { failed: usize, total: usize },

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from virtrun-core.
    #[error("{0}")]
    Core(#[from] VirtrunError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                        |
    /// |------|--------------------------------|
    /// | 0    | Success                        |
    /// | 1    | General error                  |
    /// | 2    | Configuration error            |
    /// | 3    | Job file error                 |
    /// | 4    | Tests failed                   |
    /// | 10   | IO error                       |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Job(_) => 3,
            Self::TestsFailed { .. } => 4,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}
