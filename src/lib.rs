pub mod cli;
pub mod config;
pub mod db;
pub mod pipeline;

use tracing_subscriber::EnvFilter;

/// Initialize logging and execute one CLI command.
pub fn run(command: cli::Commands) -> Result<(), String> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("ACOS pipeline v{}", config::APP_VERSION);

    cli::dispatch(command)
}
