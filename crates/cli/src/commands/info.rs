//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{PipelineBlueprint, SourceConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    version: String,
    log: LogInfo<'a>,
    producer: ProducerInfo<'a>,
    consumer: ConsumerInfo<'a>,
    retry: &'a contracts::RetryConfig,
    sink: &'a contracts::SinkConfig,
}

#[derive(Serialize)]
struct LogInfo<'a> {
    name: &'static str,
    backend: contracts::LogBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    root: Option<&'a std::path::Path>,
    partitions: u32,
    codec: &'a str,
}

#[derive(Serialize)]
struct ProducerInfo<'a> {
    batch_size: u64,
    max_concurrent_producers: usize,
    fork_policy: &'a str,
    source: &'a SourceConfig,
}

#[derive(Serialize)]
struct ConsumerInfo<'a> {
    group: &'a str,
    consumers: u32,
    assigned_partitions: Vec<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unassigned_partitions: Vec<u32>,
    failure_policy: contracts::FailurePolicy,
    on_partition_halt: contracts::HaltEscalation,
    poll_interval_ms: u64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = super::load_blueprint(&args.config)?;

    if args.json {
        let info = build_config_info(&blueprint);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn build_config_info(blueprint: &PipelineBlueprint) -> ConfigInfo<'_> {
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        log: LogInfo {
            name: blueprint.log_name(),
            backend: blueprint.log.backend,
            root: blueprint.log.root.as_deref(),
            partitions: blueprint.log.partitions,
            codec: &blueprint.log.codec,
        },
        producer: ProducerInfo {
            batch_size: blueprint.producer.batch_size,
            max_concurrent_producers: blueprint.producer.max_concurrent_producers,
            fork_policy: &blueprint.producer.fork_policy,
            source: &blueprint.producer.source,
        },
        consumer: ConsumerInfo {
            group: &blueprint.consumer.group,
            consumers: blueprint.consumer_count(),
            assigned_partitions: blueprint.assigned_partitions(),
            unassigned_partitions: blueprint.unassigned_partitions(),
            failure_policy: blueprint.consumer.failure_policy,
            on_partition_halt: blueprint.consumer.on_partition_halt,
            poll_interval_ms: blueprint.consumer.poll_interval_ms,
        },
        retry: &blueprint.retry,
        sink: &blueprint.sink,
    }
}

fn print_config_info(blueprint: &PipelineBlueprint) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Bulk Ingest Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    // Log
    let log = &blueprint.log;
    println!("🗄️  Log");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Name: {}", blueprint.log_name());
    println!("   ├─ Backend: {:?}", log.backend);
    if let Some(ref root) = log.root {
        println!("   ├─ Root: {}", root.display());
    }
    println!("   ├─ Partitions: {}", log.partitions);
    println!("   └─ Codec: {}", log.codec);

    // Producers
    let producer = &blueprint.producer;
    println!("\n🌲 Producers");
    match &producer.source {
        SourceConfig::Filesystem { path } => {
            println!("   ├─ Source: {}", path.display());
        }
        SourceConfig::Synthetic {
            fan_out,
            depth,
            blob_size,
        } => {
            println!(
                "   ├─ Source: synthetic (fan-out {}, depth {}, {} byte blobs)",
                fan_out, depth, blob_size
            );
        }
    }
    println!("   ├─ Batch size: {}", producer.batch_size);
    println!("   ├─ Max concurrent: {}", producer.max_concurrent_producers);
    println!("   └─ Fork policy: {}", producer.fork_policy);

    // Consumers
    let consumer = &blueprint.consumer;
    println!("\n📥 Consumers");
    println!("   ├─ Group: {}", consumer.group);
    println!("   ├─ Consumers: {}", blueprint.consumer_count());
    println!("   ├─ Assigned: {:?}", blueprint.assigned_partitions());
    let unassigned = blueprint.unassigned_partitions();
    if !unassigned.is_empty() {
        println!("   ├─ Unassigned: {:?}", unassigned);
    }
    println!("   ├─ Failure policy: {:?}", consumer.failure_policy);
    println!("   └─ On halt: {:?}", consumer.on_partition_halt);

    // Retry
    let retry = &blueprint.retry;
    println!("\n🔁 Retry");
    println!("   ├─ Backoff: {:?}", retry.kind);
    println!("   ├─ Base: {} ms", retry.base_ms);
    println!("   └─ Budget: {} ms", retry.budget_ms);

    // Sink
    let sink = &blueprint.sink;
    println!("\n📤 Sink");
    println!("   ├─ Name: {}", sink.name);
    if sink.params.is_empty() {
        println!("   └─ Type: {:?}", sink.sink_type);
    } else {
        println!("   ├─ Type: {:?}", sink.sink_type);
        let mut params: Vec<_> = sink.params.iter().collect();
        params.sort();
        println!("   └─ Params: {:?}", params);
    }

    println!();
}
