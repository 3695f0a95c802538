//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{LogBackend, PipelineBlueprint, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    log: String,
    partitions: u32,
    codec: String,
    consumers: u32,
    sink: String,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    // Try to load and validate
    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);

            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    log: blueprint.log_name().to_string(),
                    partitions: blueprint.log.partitions,
                    codec: blueprint.log.codec.clone(),
                    consumers: blueprint.consumer_count(),
                    sink: format!("{} ({:?})", blueprint.sink.name, blueprint.sink.sink_type),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &PipelineBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    let unassigned = blueprint.unassigned_partitions();
    if !unassigned.is_empty() {
        warnings.push(format!(
            "Partitions {:?} have no consumer in this process",
            unassigned
        ));
    }

    if let Some(consumers) = blueprint.consumer.consumers {
        if consumers > blueprint.log.partitions {
            warnings.push(format!(
                "{} consumers requested for {} partitions - extra consumers are not started",
                consumers, blueprint.log.partitions
            ));
        }
    }

    if blueprint.log.backend == LogBackend::Memory {
        warnings.push("Memory log backend - records and offsets are lost on exit".to_string());
    }

    if blueprint.sink.sink_type == SinkType::Memory && blueprint.log.backend == LogBackend::File {
        warnings.push(
            "Memory sink with a durable log - a restart resumes from committed offsets \
             but the stored entities are gone"
                .to_string(),
        );
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Log: {}", summary.log);
            println!("  Partitions: {}", summary.partitions);
            println!("  Codec: {}", summary.codec);
            println!("  Consumers: {}", summary.consumers);
            println!("  Sink: {}", summary.sink);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
