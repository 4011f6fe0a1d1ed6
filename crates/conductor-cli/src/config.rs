use clap::{Parser, Subcommand};

/// CLI for conductor
#[derive(Parser, Debug)]
#[command(
    name = "conductor",
    version,
    about = "Installs, starts and supervises local backend services"
)]
pub struct Cli {
    /// File path to the configuration file (TOML)
    #[arg(short, long, global = true)]
    pub file: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the status of every configured service
    Status,
    /// Install the environment of a service
    Setup {
        /// Service to set up
        service: String,
    },
    /// Start services and follow their output until Ctrl+C
    Run {
        /// Services to start; every installed service when empty
        services: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["conductor", "run", "ai-backend", "--file", "app.toml"]);
        assert_eq!(cli.file.as_deref(), Some("app.toml"));
        assert!(matches!(cli.command, Commands::Run { services } if services == ["ai-backend"]));
    }

    #[test]
    fn test_parse_setup_requires_service() {
        assert!(Cli::try_parse_from(["conductor", "setup"]).is_err());
    }
}
