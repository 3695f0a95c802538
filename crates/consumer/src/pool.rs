//! ConsumerPool - one worker per assigned partition

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use codec::CodecRegistry;
use contracts::{
    FailurePolicy, HaltEscalation, IngestError, MessageSink, PipelineBlueprint,
};
use logstore::Log;
use retry::RetrySettings;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::PartitionMetrics;
use crate::report::{ConsumerEvent, ConsumerReport, PartitionOutcome, PartitionSummary};
use crate::worker::{PartitionWorker, WorkerSettings};

/// Builder for creating a [`ConsumerPool`]
pub struct ConsumerPoolBuilder {
    log: Arc<dyn Log>,
    settings: WorkerSettings,
    consumers: Option<u32>,
    on_partition_halt: HaltEscalation,
    token: CancellationToken,
    drain: CancellationToken,
    subscriber: Option<mpsc::UnboundedSender<ConsumerEvent>>,
}

impl ConsumerPoolBuilder {
    pub fn new(log: Arc<dyn Log>, group: impl Into<String>) -> Self {
        Self {
            log,
            settings: WorkerSettings {
                group: group.into(),
                codecs: Arc::new(CodecRegistry::builtin()),
                retry: RetrySettings::default(),
                failure_policy: FailurePolicy::default(),
                commit_every: 50,
                poll_interval: Duration::from_millis(50),
            },
            consumers: None,
            on_partition_halt: HaltEscalation::default(),
            token: CancellationToken::new(),
            drain: CancellationToken::new(),
            subscriber: None,
        }
    }

    /// Consumer settings of a blueprint; commits follow the producer batch size
    pub fn from_blueprint(log: Arc<dyn Log>, blueprint: &PipelineBlueprint) -> Self {
        let consumer = &blueprint.consumer;
        Self::new(log, consumer.group.clone())
            .consumers(blueprint.consumer_count())
            .failure_policy(consumer.failure_policy)
            .on_partition_halt(consumer.on_partition_halt)
            .poll_interval(Duration::from_millis(consumer.poll_interval_ms))
            .commit_every(blueprint.producer.batch_size)
            .retry(RetrySettings::from_config(&blueprint.retry))
    }

    /// Worker count, capped at the partition count
    pub fn consumers(mut self, consumers: u32) -> Self {
        self.consumers = Some(consumers);
        self
    }

    pub fn codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.settings.codecs = codecs;
        self
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.settings.retry = retry;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.settings.failure_policy = policy;
        self
    }

    pub fn on_partition_halt(mut self, escalation: HaltEscalation) -> Self {
        self.on_partition_halt = escalation;
        self
    }

    pub fn commit_every(mut self, records: u64) -> Self {
        self.settings.commit_every = records;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// Pipeline cancellation; also fired by a halted partition under `FailPipeline`
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Fired by the owner once producers finished appending
    pub fn drain(mut self, drain: CancellationToken) -> Self {
        self.drain = drain;
        self
    }

    /// Receive a copy of every applied and failed record event
    pub fn subscribe(mut self, subscriber: mpsc::UnboundedSender<ConsumerEvent>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    #[instrument(name = "consumer_pool_builder_build", skip(self))]
    pub fn build(self) -> Result<ConsumerPool, IngestError> {
        let partitions = self.log.partitions();
        let consumers = self.consumers.unwrap_or(partitions);
        if consumers == 0 {
            return Err(IngestError::config_validation(
                "consumer.consumers",
                "must be at least 1",
            ));
        }
        if self.settings.commit_every == 0 {
            return Err(IngestError::config_validation(
                "producer.batch_size",
                "commit interval must be at least 1",
            ));
        }
        if self.settings.group.is_empty() {
            return Err(IngestError::config_validation(
                "consumer.group",
                "must not be empty",
            ));
        }

        let assigned = (0..consumers.min(partitions)).collect();
        Ok(ConsumerPool {
            log: self.log,
            settings: Arc::new(self.settings),
            assigned,
            on_partition_halt: self.on_partition_halt,
            token: self.token,
            drain: self.drain,
            subscriber: self.subscriber,
        })
    }
}

/// Fixed pool of partition workers over one log
pub struct ConsumerPool {
    log: Arc<dyn Log>,
    settings: Arc<WorkerSettings>,
    assigned: Vec<u32>,
    on_partition_halt: HaltEscalation,
    token: CancellationToken,
    drain: CancellationToken,
    subscriber: Option<mpsc::UnboundedSender<ConsumerEvent>>,
}

impl ConsumerPool {
    /// Partitions drained by this pool; worker `i` owns partition `i`
    pub fn assigned_partitions(&self) -> &[u32] {
        &self.assigned
    }

    /// Partitions left for another pool
    pub fn unassigned_partitions(&self) -> Vec<u32> {
        let first = self.assigned.len() as u32;
        (first..self.log.partitions()).collect()
    }

    /// Run every worker to completion.
    ///
    /// `make_sink` is called once per assigned partition before any worker
    /// starts; an error there aborts the run. Partition failures do not
    /// stop other partitions and are returned in the report.
    #[instrument(
        name = "consumer_pool_run",
        skip(self, make_sink),
        fields(
            log = %self.log.name(),
            group = %self.settings.group,
            consumers = self.assigned.len()
        )
    )]
    pub async fn run<S, F>(self, mut make_sink: F) -> Result<ConsumerReport, IngestError>
    where
        S: MessageSink + Send + 'static,
        F: FnMut(u32) -> Result<S, IngestError>,
    {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(self.assigned.len());
        for &partition in &self.assigned {
            let sink = make_sink(partition)?;
            workers.push(PartitionWorker::new(
                Arc::clone(&self.log),
                partition,
                sink,
                Arc::clone(&self.settings),
                self.token.clone(),
                self.drain.clone(),
                events_tx.clone(),
            ));
        }
        drop(events_tx);

        let unassigned = self.unassigned_partitions();
        if !unassigned.is_empty() {
            warn!(?unassigned, "Partitions without a consumer in this pool");
        }
        info!(partitions = ?self.assigned, "Consumer pool started");

        let mut running: HashMap<tokio::task::Id, (u32, Arc<PartitionMetrics>)> = HashMap::new();
        let mut tasks = JoinSet::new();
        for worker in workers {
            let entry = (worker.partition(), Arc::clone(worker.metrics()));
            let handle = tasks.spawn(worker.run());
            running.insert(handle.id(), entry);
        }

        let mut report = ConsumerReport {
            log: self.log.name().to_string(),
            group: self.settings.group.clone(),
            ..Default::default()
        };

        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => self.on_event(event, &mut report),
                Some(joined) = tasks.join_next_with_id() => {
                    let summary = match joined {
                        Ok((id, summary)) => {
                            running.remove(&id);
                            summary
                        }
                        Err(e) => {
                            error!(error = %e, "Partition worker panicked");
                            let Some((partition, metrics)) = running.remove(&e.id()) else {
                                continue;
                            };
                            PartitionSummary {
                                partition,
                                outcome: PartitionOutcome::Failed(IngestError::Other(e.to_string())),
                                committed: self
                                    .log
                                    .committed(&self.settings.group, partition)
                                    .unwrap_or_default(),
                                metrics: metrics.snapshot(),
                            }
                        }
                    };
                    self.on_partition_done(&summary);
                    report.partitions.push(summary);
                }
                else => break,
            }
        }

        report.partitions.sort_by_key(|p| p.partition);
        info!(
            applied = report.applied(),
            skipped = report.skipped(),
            failures = report.failures.len(),
            halted = ?report.halted(),
            failed = ?report.failed(),
            "Consumer pool finished"
        );
        Ok(report)
    }

    fn on_event(&self, event: ConsumerEvent, report: &mut ConsumerReport) {
        if let ConsumerEvent::Failed(failure) = &event {
            report.failures.push(failure.clone());
        }
        if let Some(subscriber) = &self.subscriber {
            if subscriber.send(event).is_err() {
                debug!("Event subscriber closed");
            }
        }
    }

    fn on_partition_done(&self, summary: &PartitionSummary) {
        let escalate = matches!(summary.outcome, PartitionOutcome::Halted { .. })
            && self.on_partition_halt == HaltEscalation::FailPipeline;
        if escalate && !self.token.is_cancelled() {
            warn!(
                partition = summary.partition,
                "Partition halted, cancelling pipeline"
            );
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use codec::{BincodeCodec, Codec, JsonCodec};
    use contracts::{BlobInfoMessage, EntityId, Message, SinkError};
    use logstore::{LogManager, MemoryLogManager};

    use crate::sinks::MemorySink;

    fn info(key: &str) -> Message {
        Message::BlobInfo(BlobInfoMessage {
            key: key.to_string(),
            digest: key.to_string(),
            length: 1,
            mime_type: None,
            encoding: None,
            filename: None,
        })
    }

    /// Log with `count` messages routed by key
    fn filled_log(partitions: u32, count: usize) -> Arc<dyn Log> {
        let log = MemoryLogManager::new()
            .create_or_open("blob-info", partitions)
            .unwrap();
        for i in 0..count {
            let message = info(&format!("key-{i}"));
            let payload = BincodeCodec.encode(&message).unwrap();
            log.append(message.partition(partitions), BincodeCodec::ID, &payload)
                .unwrap();
        }
        log
    }

    fn fast_retry(budget_ms: u64) -> RetrySettings {
        RetrySettings {
            kind: contracts::BackoffKind::Fixed,
            base: Duration::from_millis(1),
            budget: Duration::from_millis(budget_ms),
        }
    }

    /// Builder whose workers stop once caught up
    fn drained_pool(log: &Arc<dyn Log>) -> ConsumerPoolBuilder {
        let drain = CancellationToken::new();
        drain.cancel();
        ConsumerPoolBuilder::new(Arc::clone(log), "test-group")
            .poll_interval(Duration::from_millis(5))
            .commit_every(2)
            .drain(drain)
    }

    /// Fails `failures` applies with a transient error, then delegates
    #[derive(Clone)]
    struct FlakySink {
        inner: MemorySink,
        failures: Arc<AtomicU32>,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemorySink::new("flaky"),
                failures: Arc::new(AtomicU32::new(failures)),
            }
        }
    }

    impl MessageSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(SinkError::transient("flaky", "repository timeout"));
            }
            self.inner.apply(message).await
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drains_every_partition() {
        let log = filled_log(3, 9);
        let sink = MemorySink::new("memory");
        let pool = drained_pool(&log).build().unwrap();
        assert_eq!(pool.assigned_partitions(), &[0, 1, 2]);

        let report = pool.run(|_| Ok(sink.clone())).await.unwrap();

        assert!(report.all_drained());
        assert_eq!(report.applied(), 9);
        assert_eq!(sink.len(), 9);
        for summary in &report.partitions {
            let end = log.end_offset(summary.partition).unwrap();
            assert_eq!(summary.committed, end);
            assert_eq!(log.committed("test-group", summary.partition).unwrap(), end);
        }
    }

    #[tokio::test]
    async fn test_records_observed_in_offset_order() {
        let log = filled_log(3, 30);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool = drained_pool(&log).subscribe(tx).build().unwrap();
        pool.run(|_| Ok(MemorySink::new("memory"))).await.unwrap();

        let mut last: HashMap<u32, u64> = HashMap::new();
        let mut seen = 0;
        while let Ok(event) = rx.try_recv() {
            if let ConsumerEvent::Applied {
                partition, offset, ..
            } = event
            {
                if let Some(previous) = last.insert(partition, offset) {
                    assert!(offset > previous);
                }
                seen += 1;
            }
        }
        assert_eq!(seen, 30);
    }

    #[tokio::test]
    async fn test_resumes_from_committed_offset() {
        let log = filled_log(1, 5);
        log.commit("test-group", 0, 3).unwrap();

        let sink = MemorySink::new("memory");
        let report = drained_pool(&log)
            .build()
            .unwrap()
            .run(|_| Ok(sink.clone()))
            .await
            .unwrap();

        assert_eq!(report.applied(), 2);
        assert!(!sink.contains("blobinfo:key-0"));
        assert!(sink.contains("blobinfo:key-4"));
        assert_eq!(log.committed("test-group", 0).unwrap(), 5);
    }

    fn log_with_corrupt_record() -> Arc<dyn Log> {
        let log = filled_log(1, 2);
        log.append(0, BincodeCodec::ID, b"\xff\xff\xff").unwrap();
        let payload = JsonCodec.encode(&info("after")).unwrap();
        log.append(0, JsonCodec::ID, &payload).unwrap();
        log
    }

    #[tokio::test]
    async fn test_skip_policy_advances_past_corrupt_record() {
        let log = log_with_corrupt_record();
        let sink = MemorySink::new("memory");
        let report = drained_pool(&log)
            .failure_policy(FailurePolicy::Skip)
            .build()
            .unwrap()
            .run(|_| Ok(sink.clone()))
            .await
            .unwrap();

        assert!(report.all_drained());
        assert_eq!(report.applied(), 3);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.kind, "corrupt_record");
        assert_eq!((failure.partition, failure.offset), (0, 2));
        assert_eq!(failure.action, FailurePolicy::Skip);
        // mixed codecs decode by record id
        assert!(sink.contains("blobinfo:after"));
        assert_eq!(log.committed("test-group", 0).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_halt_policy_stops_partition_on_record() {
        let log = log_with_corrupt_record();
        let sink = MemorySink::new("memory");
        let token = CancellationToken::new();
        let report = drained_pool(&log)
            .failure_policy(FailurePolicy::Halt)
            .cancellation(token.clone())
            .build()
            .unwrap()
            .run(|_| Ok(sink.clone()))
            .await
            .unwrap();

        let summary = report.partition(0).unwrap();
        assert!(matches!(summary.outcome, PartitionOutcome::Halted { offset: 2 }));
        assert_eq!(summary.committed, 2);
        assert_eq!(log.committed("test-group", 0).unwrap(), 2);
        assert_eq!(report.halted(), vec![0]);
        assert!(report.is_degraded());
        // default escalation only degrades the run
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_fail_pipeline_escalation_cancels() {
        let log = log_with_corrupt_record();
        let token = CancellationToken::new();
        drained_pool(&log)
            .failure_policy(FailurePolicy::Halt)
            .on_partition_halt(HaltEscalation::FailPipeline)
            .cancellation(token.clone())
            .build()
            .unwrap()
            .run(|_| Ok(MemorySink::new("memory")))
            .await
            .unwrap();

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_unknown_codec_id_is_corrupt() {
        let log = filled_log(1, 1);
        log.append(0, 42, b"{}").unwrap();
        let report = drained_pool(&log)
            .build()
            .unwrap()
            .run(|_| Ok(MemorySink::new("memory")))
            .await
            .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, "corrupt_record");
        assert_eq!(report.failures[0].offset, 1);
    }

    #[tokio::test]
    async fn test_transient_sink_failures_are_retried() {
        let log = filled_log(1, 3);
        let sink = FlakySink::new(2);
        let report = drained_pool(&log)
            .retry(fast_retry(1_000))
            .build()
            .unwrap()
            .run(|_| Ok(sink.clone()))
            .await
            .unwrap();

        assert_eq!(report.applied(), 3);
        assert!(report.failures.is_empty());
        assert_eq!(report.partitions[0].metrics.retries, 2);
        assert_eq!(sink.inner.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_partition_failure() {
        let log = filled_log(1, 2);
        let sink = FlakySink::new(u32::MAX);
        let report = drained_pool(&log)
            .retry(fast_retry(3))
            .failure_policy(FailurePolicy::Skip)
            .build()
            .unwrap()
            .run(|_| Ok(sink.clone()))
            .await
            .unwrap();

        assert_eq!(report.applied(), 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.kind == "partition_failure"));
        assert!(report.all_drained());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_keeps_record() {
        let log = filled_log(1, 2);
        let token = CancellationToken::new();
        let pool = drained_pool(&log)
            .retry(fast_retry(60_000))
            .cancellation(token.clone())
            .build()
            .unwrap();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        });

        let started = std::time::Instant::now();
        let report = pool.run(|_| Ok(FlakySink::new(u32::MAX))).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            report.partitions[0].outcome,
            PartitionOutcome::Cancelled
        ));
        assert_eq!(report.applied(), 0);
        assert_eq!(log.committed("test-group", 0).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_busy_cursor_fails_partition() {
        let log = filled_log(2, 4);
        let _lease = log.acquire_cursor("test-group", 1).unwrap();

        let report = drained_pool(&log)
            .build()
            .unwrap()
            .run(|_| Ok(MemorySink::new("memory")))
            .await
            .unwrap();

        assert!(matches!(
            report.partition(1).unwrap().outcome,
            PartitionOutcome::Failed(IngestError::PartitionBusy { .. })
        ));
        assert!(matches!(
            report.partition(0).unwrap().outcome,
            PartitionOutcome::Drained
        ));
        assert_eq!(report.failed(), vec![1]);
    }

    #[tokio::test]
    async fn test_consumers_capped_by_partitions() {
        let log = filled_log(3, 0);
        let pool = drained_pool(&log).consumers(2).build().unwrap();
        assert_eq!(pool.assigned_partitions(), &[0, 1]);
        assert_eq!(pool.unassigned_partitions(), vec![2]);

        let pool = drained_pool(&log).consumers(8).build().unwrap();
        assert_eq!(pool.assigned_partitions(), &[0, 1, 2]);

        assert!(drained_pool(&log).consumers(0).build().is_err());
        assert!(drained_pool(&log).commit_every(0).build().is_err());
    }

    #[tokio::test]
    async fn test_tails_live_appends_until_drained() {
        let log = filled_log(1, 1);
        let drain = CancellationToken::new();
        let sink = MemorySink::new("memory");
        let pool = ConsumerPoolBuilder::new(Arc::clone(&log), "live")
            .poll_interval(Duration::from_millis(5))
            .drain(drain.clone())
            .build()
            .unwrap();

        let run_sink = sink.clone();
        let handle = tokio::spawn(async move { pool.run(move |_| Ok(run_sink.clone())).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        for key in ["late-1", "late-2"] {
            let payload = BincodeCodec.encode(&info(key)).unwrap();
            log.append(0, BincodeCodec::ID, &payload).unwrap();
        }
        drain.cancel();

        let report = handle.await.unwrap().unwrap();
        assert!(report.all_drained());
        assert_eq!(report.applied(), 3);
        assert!(sink.contains("blobinfo:late-2"));
    }
}
