// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `caseflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "caseflow",
    version,
    about = "Inspect the case lifecycle rules and validate engine configuration.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CASEFLOW_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the legality matrix of node transitions, including the
    /// configured close policy.
    Table {
        /// Config file to take the close policy from. Defaults apply when
        /// the file does not exist.
        #[arg(long, value_name = "PATH", default_value = "Caseflow.toml")]
        config: PathBuf,
    },
    /// Load and validate a config file, then print the effective settings.
    Check {
        #[arg(long, value_name = "PATH", default_value = "Caseflow.toml")]
        config: PathBuf,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
