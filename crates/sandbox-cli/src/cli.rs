use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "sandbox",
    about = "Ephemeral IIIF manifest store secured by capability URLs",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Optional subcommand; defaults to serving when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server until interrupted.
    Serve,
    /// Print version and exit.
    Version,
    /// Round-trip a probe object through the configured store.
    Health,
    /// Manage configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
    /// Print the effective configuration.
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_subcommand() {
        let cli = Cli::try_parse_from(["sandbox", "serve"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Serve));
        assert_eq!(cli.config, None);
    }

    #[test]
    fn defaults_to_serve_when_missing_subcommand() {
        let cli = Cli::try_parse_from(["sandbox"]).expect("parse should succeed");
        assert_eq!(cli.command, None);
    }

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["sandbox", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Health));
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli =
            Cli::try_parse_from(["sandbox", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Some(Command::Config(ConfigCommand::Init)));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["sandbox", "health", "--config", "/etc/sandbox.toml"])
            .expect("parse should succeed");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sandbox.toml")));
        assert_eq!(cli.command, Some(Command::Health));
    }
}
