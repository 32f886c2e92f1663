//! Logging initialization for the virtrun binary.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `RunnerConfig`. Supports JSON structured logging and a human-readable
//! pretty format.

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use virtrun_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
/// `RUST_LOG` wins over `config.log_level` when set. Logs go to stderr so
/// `--output json` keeps stdout machine-readable.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match config.log_format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "pretty" => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    };

    installed.context("failed to initialize tracing subscriber")
}
