use clap::Parser;

use virtrun_cli::cli::{Cli, Commands};
use virtrun_cli::commands;
use virtrun_cli::error::CliError;
use virtrun_cli::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = commands::load_config(&cli).await?;

    logging::init_tracing(&config.general).map_err(|e| CliError::Config(format!("{e:#}")))?;
    tracing::info!(config = %cli.config.display(), "virtrun starting");

    match &cli.command {
        Commands::Run(args) => commands::run_job(&config, args, cli.output).await,
        Commands::Cleanup(args) => commands::cleanup(&config, args, cli.output),
    }
}
