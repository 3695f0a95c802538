//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{HaltEscalation, PipelineBlueprint, SourceConfig};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut blueprint = super::load_blueprint(&args.config)?;

    // Apply CLI overrides
    apply_overrides(&mut blueprint, args);
    config_loader::ConfigLoader::validate(&blueprint)
        .context("Configuration invalid after CLI overrides")?;

    info!(
        log = blueprint.log_name(),
        backend = ?blueprint.log.backend,
        partitions = blueprint.log.partitions,
        codec = %blueprint.log.codec,
        consumers = blueprint.consumer_count(),
        sink = %blueprint.sink.name,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let fail_on_halt = blueprint.consumer.on_partition_halt == HaltEscalation::FailPipeline;

    // Build pipeline configuration
    let pipeline_config = PipelineConfig {
        blueprint,
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
        skip_produce: args.skip_produce,
    };

    // Create and run pipeline
    let pipeline = Pipeline::new(pipeline_config);
    let token = pipeline.cancellation();

    // Setup graceful shutdown handler
    let shutdown_signal = setup_shutdown_signal();

    info!("Starting pipeline...");

    let run = pipeline.run();
    tokio::pin!(run);

    // workers stop cooperatively, so the run is awaited to completion either way
    let result = tokio::select! {
        result = &mut run => result,
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping pipeline...");
            token.cancel();
            run.await
        }
    };

    let stats = result.context("Pipeline execution failed")?;
    info!(
        applied = stats.consumer.applied(),
        skipped = stats.consumer.skipped(),
        duration_secs = stats.duration.as_secs_f64(),
        records_per_sec = format!("{:.2}", stats.throughput()),
        outcome = stats.outcome(),
        "Pipeline completed"
    );
    observability::record_run_finished(stats.outcome(), stats.duration.as_secs_f64());

    // Print detailed statistics
    stats.print_summary();

    if fail_on_halt && stats.consumer.is_degraded() {
        let mut partitions = stats.consumer.halted();
        partitions.extend(stats.consumer.failed());
        partitions.sort_unstable();
        return Err(CliError::PartitionsHalted { partitions }.into());
    }

    info!("Bulk ingest finished");
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(blueprint: &mut PipelineBlueprint, args: &RunArgs) {
    if let Some(partitions) = args.partitions {
        info!(partitions, "Overriding partition count from CLI");
        blueprint.log.partitions = partitions;
    }
    if let Some(ref codec) = args.codec {
        info!(codec = %codec, "Overriding codec from CLI");
        blueprint.log.codec = codec.clone();
    }
    if let Some(ref source) = args.source {
        info!(source = %source.display(), "Overriding source from CLI");
        blueprint.producer.source = SourceConfig::Filesystem {
            path: source.clone(),
        };
    }
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Log:");
    println!(
        "  {} ({:?}, {} partitions, codec {})",
        blueprint.log_name(),
        blueprint.log.backend,
        blueprint.log.partitions,
        blueprint.log.codec
    );
    println!("\nProducers:");
    println!("  Source: {:?}", blueprint.producer.source);
    println!(
        "  Batch size: {}, max concurrent: {}, fork policy: {}",
        blueprint.producer.batch_size,
        blueprint.producer.max_concurrent_producers,
        blueprint.producer.fork_policy
    );
    println!("\nConsumers:");
    println!("  Group: {}", blueprint.consumer.group);
    println!("  Assigned partitions: {:?}", blueprint.assigned_partitions());
    println!("\nSink: {} ({:?})", blueprint.sink.name, blueprint.sink.sink_type);
    println!();
}
