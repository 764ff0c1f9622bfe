//! Command-line interface definition.

use clap::{Parser, Subcommand};

/// The `mnemon` command.
#[derive(Debug, Parser)]
#[command(
    name = "mnemon",
    version,
    about = "Mnemon — personal intelligence gateway with agent routing"
)]
pub struct Cli {
    /// Validate wiring and exit (equivalent to the `test` subcommand).
    #[arg(long, global = true)]
    pub test: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the gateway server (the default).
    Serve {
        /// Interface to bind.
        #[arg(long)]
        bind: Option<String>,

        /// TCP port (overrides MNEMON_PORT).
        #[arg(long)]
        port: Option<u16>,

        /// Terminate a previous instance holding the port and retry binding.
        #[arg(long)]
        reclaim_port: bool,
    },

    /// Validate wiring and exit non-zero on failure.
    Test,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["mnemon"]);
        assert!(cli.command.is_none());
        assert!(!cli.test);
    }

    #[test]
    fn test_flag_parses() {
        let cli = Cli::parse_from(["mnemon", "--test"]);
        assert!(cli.test);
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::parse_from(["mnemon", "serve", "--port", "9100", "--reclaim-port"]);
        match cli.command {
            Some(Commands::Serve {
                port,
                reclaim_port,
                ..
            }) => {
                assert_eq!(port, Some(9100));
                assert!(reclaim_port);
            }
            other => panic!("expected serve, got {other:?}"),
        }
    }
}
