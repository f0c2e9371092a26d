//! tools: command-line front end for the self-update subsystem.
//!
//! # Usage
//!
//! ```text
//! tools update [--force] [--check] [--json]
//! tools self-update
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{self_update::SelfUpdateArgs, update::UpdateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "tools",
    version,
    about = "Keep the tools binary in sync with its upstream repository",
    long_about = None,
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull the latest source, rebuild and replace this executable.
    Update(UpdateArgs),

    /// Rebuild from the current source tree without contacting the remote.
    SelfUpdate(SelfUpdateArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Update(args) => args.run(),
        Commands::SelfUpdate(args) => args.run(),
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn update_flags_build_options() {
        let cli = Cli::try_parse_from(["tools", "update", "--force"]).unwrap();
        match cli.command {
            Commands::Update(args) => {
                let options = args.options();
                assert!(options.force);
                assert!(!options.check_only);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn force_and_check_are_exclusive() {
        let err = Cli::try_parse_from(["tools", "update", "--force", "--check"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn verbosity_is_global() {
        let cli = Cli::try_parse_from(["tools", "self-update", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
