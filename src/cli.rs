// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `nodedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nodedag",
    version,
    about = "Resolve a node of a dataflow workflow together with everything it depends on.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    #[arg(long, value_name = "PATH", default_value = "workflow.toml")]
    pub workflow: String,

    /// Node to resolve.
    #[arg(long, value_name = "NODE")]
    pub target: String,

    /// Parse + validate, print the evaluation order, but don't run any node.
    #[arg(long)]
    pub dry_run: bool,

    /// Pause after every node; press Enter to run the next one.
    #[arg(long)]
    pub step: bool,

    /// Where node events go: JSON lines on stdout, or the log.
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = EventFormat::Json)]
    pub events: EventFormat,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NODEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum EventFormat {
    Json,
    Log,
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
