//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Bulk Ingest - partitioned, log-based bulk import pipeline
#[derive(Parser, Debug)]
#[command(
    name = "bulk-ingest",
    author,
    version,
    about = "Partitioned log-based bulk ingestion pipeline",
    long_about = "Walks a source tree with adaptive producer workers, appends every node \n\
                  to a partitioned log and drains each partition into the configured \n\
                  sink with one consumer per partition."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "BULK_INGEST_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "BULK_INGEST_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run producers and consumers until the log is drained
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Show consumer group lag of an existing file log
    Lag(LagArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "ingest.toml",
        env = "BULK_INGEST_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the partition count of the log
    #[arg(long, env = "BULK_INGEST_PARTITIONS")]
    pub partitions: Option<u32>,

    /// Override the codec used for appended records
    #[arg(long, env = "BULK_INGEST_CODEC")]
    pub codec: Option<String>,

    /// Import this directory instead of the configured source
    #[arg(long, env = "BULK_INGEST_SOURCE")]
    pub source: Option<PathBuf>,

    /// Only drain what is already in the log
    #[arg(long)]
    pub skip_produce: bool,

    /// Pipeline timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "BULK_INGEST_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "9000", env = "BULK_INGEST_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "ingest.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "ingest.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `lag` command
#[derive(Parser, Debug)]
pub struct LagArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "ingest.toml")]
    pub config: PathBuf,

    /// Consumer group (defaults to the configured group)
    #[arg(short, long)]
    pub group: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_overrides() {
        let cli = Cli::try_parse_from([
            "bulk-ingest",
            "run",
            "-c",
            "custom.toml",
            "--partitions",
            "4",
            "--codec",
            "json",
            "--skip-produce",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from("custom.toml"));
                assert_eq!(args.partitions, Some(4));
                assert_eq!(args.codec.as_deref(), Some("json"));
                assert!(args.skip_produce);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_lag_group() {
        let cli = Cli::try_parse_from(["bulk-ingest", "lag", "--group", "replay"]).unwrap();
        match cli.command {
            Commands::Lag(args) => {
                assert_eq!(args.config, PathBuf::from("ingest.toml"));
                assert_eq!(args.group.as_deref(), Some("replay"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["bulk-ingest", "-q", "-v", "info"]).is_err());
    }
}
