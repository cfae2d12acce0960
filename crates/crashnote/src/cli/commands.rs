//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

/// Report command arguments.
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// The error message
    pub message: String,

    /// Stack trace text
    #[arg(long)]
    pub stack: Option<String>,

    /// Component stack text
    #[arg(long)]
    pub component_stack: Option<String>,

    /// Correlation identifier passed through to the report
    #[arg(short = 'i', long)]
    pub error_id: Option<String>,

    /// User agent to report instead of the ambient one
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Location to report instead of the ambient one
    #[arg(long)]
    pub url: Option<String>,

    /// Timestamp to use instead of now (RFC 3339)
    #[arg(long, value_parser = parse_instant)]
    pub at: Option<DateTime<Utc>>,

    /// Extra context as key=value (repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub context: Vec<(String, String)>,

    /// Pretty-print the JSON output
    #[arg(short, long)]
    pub pretty: bool,
}

/// Env command arguments.
#[derive(Debug, Args)]
pub struct EnvCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Classify command arguments.
#[derive(Debug, Args)]
pub struct ClassifyCommand {
    /// The error message to classify
    pub message: String,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stored user identifier commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Show the stored user id
    Show,

    /// Store a user id
    Set {
        /// The user id to store
        id: String,
    },

    /// Remove the stored user id
    Clear,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        file: Option<PathBuf>,
    },
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{value}': {e}"))
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), val.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{value}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant() {
        let dt = parse_instant("2024-01-02T03:04:05Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-01-02T03:04:05+00:00");

        let offset = parse_instant("2024-01-02T05:04:05+02:00").unwrap();
        assert_eq!(offset, dt);

        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("page=donations").unwrap(),
            ("page".to_string(), "donations".to_string())
        );
        assert_eq!(
            parse_key_value("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
