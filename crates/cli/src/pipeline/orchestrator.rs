//! Pipeline orchestrator - coordinates all components.
//!
//! Producers and consumers share one log and run concurrently. The drain
//! token fires once producers are done, after which each consumer stops as
//! soon as it reaches the end of its partition. Cancellation (signal,
//! timeout, producer failure or an escalated halt) is cooperative: every
//! worker commits what it applied before returning.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use codec::CodecRegistry;
use consumer::{ConsumerEvent, ConsumerPoolBuilder, SinkFactory};
use contracts::{LogBackend, PipelineBlueprint};
use ingestion::{fork_policy, source_root, LogAppender, ProducerPoolBuilder, ProducerReport};
use logstore::{FileLogManager, Log, LogManager, MemoryLogManager};
use observability::{record_failure_report, record_group_lag, record_producers_finished};
use retry::RetrySettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The pipeline blueprint, overrides already applied
    pub blueprint: PipelineBlueprint,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Drain the log without walking the source
    pub skip_produce: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
    token: CancellationToken,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            token: CancellationToken::new(),
        }
    }

    /// Token cancelling the whole run
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run the pipeline to completion
    pub async fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let log = open_log(blueprint)?;
        info!(
            log = log.name(),
            partitions = log.partitions(),
            backend = ?blueprint.log.backend,
            "Log opened"
        );

        // Setup consumers
        let factory = SinkFactory::from_config(&blueprint.sink).context("Failed to create sink")?;
        let memory_store = factory.memory().cloned();
        let drain = CancellationToken::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<ConsumerEvent>();

        let consumers = ConsumerPoolBuilder::from_blueprint(Arc::clone(&log), blueprint)
            .cancellation(self.token.clone())
            .drain(drain.clone())
            .subscribe(events_tx)
            .build()
            .context("Failed to build consumer pool")?;

        let unassigned = consumers.unassigned_partitions();
        if !unassigned.is_empty() {
            warn!(
                partitions = ?unassigned,
                "Partitions without a consumer in this process"
            );
        }
        info!(
            group = %blueprint.consumer.group,
            assigned = ?consumers.assigned_partitions(),
            sink = %blueprint.sink.name,
            "Consumer pool configured"
        );

        let consumer_handle = tokio::spawn(consumers.run(move |partition| factory.make(partition)));

        // Setup producers
        let producer = self.produce(Arc::clone(&log), drain.clone());
        tokio::pin!(producer);

        let mut stats = PipelineStats::default();
        let mut producer_done = false;
        let mut producer_error = None;
        let deadline = self.config.timeout.map(|timeout| Instant::now() + timeout);
        let mut timed_out = false;

        loop {
            tokio::select! {
                result = &mut producer, if !producer_done => {
                    producer_done = true;
                    match result {
                        Ok(report) => {
                            if let Some(ref report) = report {
                                info!(
                                    produced = report.produced,
                                    forks = report.forks,
                                    aborts = report.aborts,
                                    cancelled = report.cancelled,
                                    "Producers finished, draining"
                                );
                                record_producers_finished(report.produced, report.aborts);
                            }
                            stats.producer = report;
                        }
                        Err(e) => {
                            error!(error = %e, "Producer pool failed, cancelling pipeline");
                            self.token.cancel();
                            producer_error = Some(e);
                        }
                    }
                }
                event = events_rx.recv() => match event {
                    Some(event) => observe(&mut stats, event),
                    // every worker returned and the pool dropped its sender
                    None => break,
                },
                _ = sleep_until(deadline), if !timed_out => {
                    timed_out = true;
                    warn!(
                        timeout_secs = self.config.timeout.map(|t| t.as_secs()),
                        "Pipeline timed out, cancelling"
                    );
                    self.token.cancel();
                }
            }
        }

        // consumers may finish first when nothing is assigned
        if !producer_done {
            match producer.await {
                Ok(report) => stats.producer = report,
                Err(e) => producer_error = Some(e),
            }
        }

        let report = consumer_handle
            .await
            .context("Consumer pool panicked")?
            .context("Consumer pool failed")?;

        if let Some(e) = producer_error {
            return Err(e).context("Producer pool failed");
        }

        match log.lag(&blueprint.consumer.group) {
            Ok(lag) => {
                for (partition, partition_lag) in lag.partitions.iter().enumerate() {
                    record_group_lag(&lag.log, &lag.group, partition as u32, partition_lag);
                }
                stats.lag = Some(lag);
            }
            Err(e) => warn!(error = %e, "Cannot compute consumer lag"),
        }

        stats.entities = memory_store.map(|store| store.len());
        stats.cancelled = self.token.is_cancelled();
        stats.consumer = report;
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            applied = stats.consumer.applied(),
            skipped = stats.consumer.skipped(),
            outcome = stats.outcome(),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Walk the source into the log, then fire `drain`
    async fn produce(
        &self,
        log: Arc<dyn Log>,
        drain: CancellationToken,
    ) -> Result<Option<ProducerReport>> {
        let result = if self.config.skip_produce {
            info!("Skipping producers, draining existing records");
            Ok(None)
        } else {
            self.walk_source(log).await.map(Some)
        };
        drain.cancel();
        result
    }

    async fn walk_source(&self, log: Arc<dyn Log>) -> Result<ProducerReport> {
        let blueprint = &self.config.blueprint;
        let producer = &blueprint.producer;

        let codec = CodecRegistry::builtin().get(&blueprint.log.codec)?;
        let policy = fork_policy(&producer.fork_policy, producer.max_concurrent_producers)?;
        let root = source_root(&producer.source).context("Failed to open source tree")?;

        info!(
            source = ?producer.source,
            codec = codec.name(),
            fork_policy = policy.name(),
            batch_size = producer.batch_size,
            max_concurrent = producer.max_concurrent_producers,
            "Starting producers"
        );

        let appender = LogAppender::new(
            log,
            codec,
            RetrySettings::from_config(&blueprint.retry),
            self.token.clone(),
        );
        let report = ProducerPoolBuilder::new(appender)
            .fork_policy(policy)
            .batch_size(producer.batch_size)
            .log_kind(blueprint.log.name)
            .cancellation(self.token.clone())
            .build()
            .run(root)
            .await?;
        Ok(report)
    }
}

/// Open (or create) the configured log
fn open_log(blueprint: &PipelineBlueprint) -> Result<Arc<dyn Log>> {
    let log_config = &blueprint.log;
    let manager: Box<dyn LogManager> = match log_config.backend {
        LogBackend::File => {
            let root = log_config
                .root
                .clone()
                .unwrap_or_else(|| PathBuf::from("./ingest-data"));
            Box::new(FileLogManager::new(root))
        }
        LogBackend::Memory => Box::new(MemoryLogManager::new()),
    };

    manager
        .create_or_open(blueprint.log_name(), log_config.partitions)
        .with_context(|| format!("Failed to open log '{}'", blueprint.log_name()))
}

fn observe(stats: &mut PipelineStats, event: ConsumerEvent) {
    match event {
        ConsumerEvent::Applied {
            partition,
            offset,
            entity,
            latency,
        } => {
            debug!(partition, offset, entity = %entity, "Entity stored");
            stats
                .ingest
                .record_applied(partition, latency.as_secs_f64() * 1000.0);
        }
        ConsumerEvent::Failed(report) => {
            record_failure_report(report.kind, failure_action(&report));
            stats.ingest.record_failure(report.kind);
        }
    }
}

fn failure_action(report: &consumer::FailureReport) -> &'static str {
    match report.action {
        contracts::FailurePolicy::Skip => "skip",
        contracts::FailurePolicy::Halt => "halt",
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        ConfigVersion, ConsumerConfig, LogConfig, LogKind, ProducerConfig, RetryConfig,
        SinkConfig, SinkType, SourceConfig,
    };

    fn synthetic_blueprint(backend: LogBackend, root: Option<PathBuf>) -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            log: LogConfig {
                backend,
                root,
                name: LogKind::Document,
                partitions: 3,
                codec: "bincode".into(),
            },
            producer: ProducerConfig {
                batch_size: 9,
                max_concurrent_producers: 4,
                fork_policy: "adaptive".into(),
                source: SourceConfig::Synthetic {
                    fan_out: 3,
                    depth: 2,
                    blob_size: 16,
                },
            },
            consumer: ConsumerConfig {
                poll_interval_ms: 5,
                ..ConsumerConfig::default()
            },
            retry: RetryConfig::default(),
            sink: SinkConfig {
                name: "mem".into(),
                sink_type: SinkType::Memory,
                params: Default::default(),
            },
        }
    }

    fn config(blueprint: PipelineBlueprint) -> PipelineConfig {
        PipelineConfig {
            blueprint,
            timeout: None,
            metrics_port: None,
            skip_produce: false,
        }
    }

    #[tokio::test]
    async fn test_memory_pipeline_drains() {
        let blueprint = synthetic_blueprint(LogBackend::Memory, None);
        let stats = Pipeline::new(config(blueprint)).run().await.unwrap();

        let produced = stats.producer.as_ref().unwrap().produced;
        // 3 + 9 nodes below the import root
        assert_eq!(produced, 12);
        assert_eq!(stats.consumer.applied(), produced);
        assert_eq!(stats.ingest.total_applied, produced);
        assert_eq!(stats.entities, Some(12));
        assert!(stats.consumer.all_drained());
        assert!(!stats.cancelled);
        assert_eq!(stats.lag.as_ref().unwrap().total().pending, 0);
        assert_eq!(stats.outcome(), "completed");
    }

    #[tokio::test]
    async fn test_file_pipeline_restart_skips_committed() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = synthetic_blueprint(LogBackend::File, Some(dir.path().to_path_buf()));

        let first = Pipeline::new(config(blueprint.clone())).run().await.unwrap();
        assert_eq!(first.consumer.applied(), 12);

        let mut rerun = config(blueprint);
        rerun.skip_produce = true;
        let second = Pipeline::new(rerun).run().await.unwrap();
        assert!(second.producer.is_none());
        assert_eq!(second.consumer.applied(), 0);
        assert!(second.consumer.all_drained());
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let blueprint = synthetic_blueprint(LogBackend::Memory, None);
        let pipeline = Pipeline::new(config(blueprint));
        pipeline.cancellation().cancel();

        let stats = pipeline.run().await.unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.outcome(), "cancelled");
    }

    #[tokio::test]
    async fn test_missing_source_fails() {
        let mut blueprint = synthetic_blueprint(LogBackend::Memory, None);
        blueprint.producer.source = SourceConfig::Filesystem {
            path: PathBuf::from("/definitely/not/here"),
        };
        let result = Pipeline::new(config(blueprint)).run().await;
        assert!(result.is_err());
    }
}
