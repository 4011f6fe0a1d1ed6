use anyhow::Result;
use clap::Parser;

mod commands;
mod config;
mod logger;

const DEFAULT_FILENAMES: [&str; 2] = ["conductor.toml", "Conductor.toml"];

/// Logs go to stderr so service output on stdout stays readable.
fn configure_logger(json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    configure_logger(cli.json);

    match cli.command {
        config::Commands::Status => commands::status(cli.file).await,
        config::Commands::Setup { service } => commands::setup(cli.file, service).await,
        config::Commands::Run { services } => commands::run(cli.file, services).await,
    }
}
