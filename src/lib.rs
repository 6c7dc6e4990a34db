pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;
pub mod pipeline_config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub use cli::RunError;

/// Entry point of the `medrecord` binary.
pub fn run() -> Result<(), RunError> {
    // Logs go to stderr; stdout carries the JSON output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let cli = cli::Cli::parse();
    let config = pipeline_config::ExtractionConfig::from_env();
    tracing::debug!(?config, "Extraction configuration");

    let stdout = std::io::stdout();
    cli::execute(cli, &config, &mut stdout.lock())
}
