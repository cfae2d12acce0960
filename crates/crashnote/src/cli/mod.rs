//! Command-line interface for crashnote.
//!
//! This module provides the CLI structure for the `crashnote` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ClassifyCommand, ConfigCommand, EnvCommand, ReportCommand, UserCommand};

/// crashnote - Structured error reports with environment capture
///
/// Builds error reports enriched with the user agent, location and user
/// identifier of the environment they happened in.
#[derive(Debug, Parser)]
#[command(name = "crashnote")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Handle an error and print the resulting incident
    Report(ReportCommand),

    /// Show the resolved environment
    Env(EnvCommand),

    /// Classify an error message
    Classify(ClassifyCommand),

    /// Manage the stored user id
    #[command(subcommand)]
    User(UserCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
