//! Pipeline statistics and metrics.

use std::time::Duration;

use consumer::{ConsumerReport, PartitionOutcome};
use ingestion::ProducerReport;
use logstore::GroupLag;
use observability::IngestStatsAggregator;

/// Statistics from a pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Producer report (None when producing was skipped)
    pub producer: Option<ProducerReport>,

    /// Per-partition consumer outcomes
    pub consumer: ConsumerReport,

    /// Aggregated consumer events
    pub ingest: IngestStatsAggregator,

    /// Group lag at shutdown
    pub lag: Option<GroupLag>,

    /// Entities held by a memory sink
    pub entities: Option<usize>,

    /// Run stopped by cancellation
    pub cancelled: bool,

    /// Total duration of the pipeline run
    pub duration: Duration,
}

impl PipelineStats {
    /// Records applied per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.consumer.applied() as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Short label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        if self.consumer.is_degraded() {
            "degraded"
        } else if self.cancelled {
            "cancelled"
        } else {
            "completed"
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Pipeline Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Outcome: {}", self.outcome());
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Applied: {}", self.consumer.applied());
        println!("   ├─ Skipped: {}", self.consumer.skipped());
        if let Some(entities) = self.entities {
            println!("   ├─ Entities stored: {}", entities);
        }
        println!("   └─ Records/s: {:.2}", self.throughput());

        if let Some(ref producer) = self.producer {
            println!("\n🌲 Producers");
            println!("   ├─ Produced: {}", producer.produced);
            println!("   ├─ Appended: {}", producer.appended);
            println!("   ├─ Forks: {}", producer.forks);
            println!("   ├─ Append retries: {}", producer.retries);
            println!("   └─ Aborted branches: {}", producer.aborts);
        }

        println!(
            "\n📥 Consumers (log {}, group {})",
            self.consumer.log, self.consumer.group
        );
        for (i, partition) in self.consumer.partitions.iter().enumerate() {
            let prefix = if i + 1 == self.consumer.partitions.len() {
                "└─"
            } else {
                "├─"
            };
            let detail = match &partition.outcome {
                PartitionOutcome::Halted { offset } => format!(" at offset {offset}"),
                PartitionOutcome::Failed(e) => format!(": {e}"),
                _ => String::new(),
            };
            println!(
                "   {} partition {}: {}{} (applied {}, skipped {}, retries {}, committed {})",
                prefix,
                partition.partition,
                partition.outcome.label(),
                detail,
                partition.metrics.applied,
                partition.metrics.skipped,
                partition.metrics.retries,
                partition.committed
            );
        }

        if let Some(ref lag) = self.lag {
            let total = lag.total();
            println!("\n⏳ Lag: {} pending of {} records", total.pending, total.end);
        }

        if !self.consumer.failures.is_empty() {
            println!("\n⚠️  Failure Reports ({})", self.consumer.failures.len());
            for failure in &self.consumer.failures {
                println!("   ├─ {}", failure);
            }
        }

        println!("\n{}", self.ingest.summary());
    }
}
