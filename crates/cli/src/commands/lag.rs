//! `lag` command implementation.

use anyhow::{Context, Result};
use contracts::LogBackend;
use logstore::{FileLogManager, LogManager};
use tracing::info;

use crate::cli::LagArgs;
use crate::error::CliError;

/// Execute the `lag` command
pub fn run_lag(args: &LagArgs) -> Result<()> {
    let blueprint = super::load_blueprint(&args.config)?;

    if blueprint.log.backend != LogBackend::File {
        return Err(CliError::UnsupportedBackend {
            command: "lag",
            expected: "file",
        }
        .into());
    }
    let root = blueprint
        .log
        .root
        .clone()
        .context("log.root is not configured")?;
    let group = args
        .group
        .clone()
        .unwrap_or_else(|| blueprint.consumer.group.clone());

    info!(root = %root.display(), log = blueprint.log_name(), group = %group, "Reading lag");

    let log = FileLogManager::new(root)
        .open(blueprint.log_name())
        .with_context(|| format!("Failed to open log '{}'", blueprint.log_name()))?;
    let lag = log.lag(&group).context("Failed to read committed offsets")?;

    if args.json {
        let json = serde_json::to_string_pretty(&lag).context("Failed to serialize lag")?;
        println!("{}", json);
        return Ok(());
    }

    println!("Log {} / group {}", lag.log, lag.group);
    println!("{:>9}  {:>12}  {:>12}  {:>8}", "partition", "end", "committed", "lag");
    for (partition, partition_lag) in lag.partitions.iter().enumerate() {
        println!(
            "{:>9}  {:>12}  {:>12}  {:>8}",
            partition,
            partition_lag.end,
            partition_lag.committed(),
            partition_lag.pending
        );
    }
    let total = lag.total();
    println!(
        "{:>9}  {:>12}  {:>12}  {:>8}",
        "total",
        total.end,
        total.committed(),
        total.pending
    );

    Ok(())
}
