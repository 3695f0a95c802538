//! PartitionWorker - drains one partition into a sink

use std::sync::Arc;
use std::time::{Duration, Instant};

use codec::CodecRegistry;
use contracts::{FailurePolicy, IngestError, LogRecord, Message, MessageSink, Offset};
use logstore::{Log, Tail};
use retry::RetrySettings;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::metrics::PartitionMetrics;
use crate::report::{ConsumerEvent, FailureReport, PartitionOutcome, PartitionSummary};

/// Settings shared by every worker of a pool
#[derive(Clone)]
pub struct WorkerSettings {
    pub group: String,
    pub codecs: Arc<CodecRegistry>,
    pub retry: RetrySettings,
    pub failure_policy: FailurePolicy,
    /// Commit the cursor after this many consumed records
    pub commit_every: u64,
    /// Wait between polls once caught up
    pub poll_interval: Duration,
}

impl std::fmt::Debug for WorkerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSettings")
            .field("group", &self.group)
            .field("codecs", &self.codecs.names())
            .field("retry", &self.retry)
            .field("failure_policy", &self.failure_policy)
            .field("commit_every", &self.commit_every)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// What to do after a record was handled
enum Step {
    Advance,
    Halt,
    Cancelled,
}

/// Sole consumer of one `(group, partition)` cursor
pub struct PartitionWorker<S> {
    log: Arc<dyn Log>,
    partition: u32,
    sink: S,
    settings: Arc<WorkerSettings>,
    /// Pipeline cancellation
    token: CancellationToken,
    /// Fired once producers finished appending
    drain: CancellationToken,
    events: mpsc::UnboundedSender<ConsumerEvent>,
    metrics: Arc<PartitionMetrics>,
}

impl<S: MessageSink + Send + 'static> PartitionWorker<S> {
    pub fn new(
        log: Arc<dyn Log>,
        partition: u32,
        sink: S,
        settings: Arc<WorkerSettings>,
        token: CancellationToken,
        drain: CancellationToken,
        events: mpsc::UnboundedSender<ConsumerEvent>,
    ) -> Self {
        let metrics = Arc::new(PartitionMetrics::new(log.name(), partition));
        Self {
            log,
            partition,
            sink,
            settings,
            token,
            drain,
            events,
            metrics,
        }
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn metrics(&self) -> &Arc<PartitionMetrics> {
        &self.metrics
    }

    /// Consume until drained, cancelled, halted or failed.
    ///
    /// The cursor is committed every `commit_every` records and on exit, and
    /// always points at the first record that was neither applied nor
    /// skipped, so a restart resumes exactly there.
    #[instrument(
        name = "partition_worker",
        skip(self),
        fields(
            log = %self.log.name(),
            partition = self.partition,
            group = %self.settings.group
        )
    )]
    pub async fn run(mut self) -> PartitionSummary {
        let log = Arc::clone(&self.log);
        let group = self.settings.group.clone();

        let lease = match log.acquire_cursor(&group, self.partition) {
            Ok(lease) => lease,
            Err(e) => {
                error!(error = %e, "Cannot acquire partition cursor");
                return self.summary(PartitionOutcome::Failed(e), 0);
            }
        };
        let start = match log.committed(&group, self.partition) {
            Ok(offset) => offset,
            Err(e) => {
                error!(error = %e, "Cannot read committed offset");
                return self.summary(PartitionOutcome::Failed(e), 0);
            }
        };
        info!(from = start, "Partition worker started");

        let mut tail = log.tail(self.partition, start);
        let mut next = start;
        let mut committed = start;
        let outcome = self
            .consume(log.as_ref(), &mut tail, &mut next, &mut committed)
            .await;

        if next != committed {
            self.commit(log.as_ref(), next, &mut committed);
        }
        if let Err(e) = self.sink.flush().await {
            warn!(error = %e, "Sink flush failed on shutdown");
        }
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "Sink close failed on shutdown");
        }
        drop(lease);

        info!(
            outcome = outcome.label(),
            committed,
            applied = self.metrics.applied(),
            skipped = self.metrics.skipped(),
            "Partition worker stopped"
        );
        self.summary(outcome, committed)
    }

    async fn consume(
        &mut self,
        log: &dyn Log,
        tail: &mut Tail<'_>,
        next: &mut Offset,
        committed: &mut Offset,
    ) -> PartitionOutcome {
        let mut read_gate = None;
        loop {
            if self.token.is_cancelled() {
                return PartitionOutcome::Cancelled;
            }

            match tail.next() {
                Some(Ok(record)) => {
                    read_gate = None;
                    match self.process(&record).await {
                        Step::Advance => {
                            *next = record.offset + 1;
                            if *next - *committed >= self.settings.commit_every {
                                self.commit(log, *next, committed);
                            }
                        }
                        Step::Halt => {
                            return PartitionOutcome::Halted {
                                offset: record.offset,
                            }
                        }
                        Step::Cancelled => return PartitionOutcome::Cancelled,
                    }
                }
                Some(Err(e)) if e.is_transient() => {
                    let gate =
                        read_gate.get_or_insert_with(|| self.settings.retry.gate(self.token.clone()));
                    if !gate.allow() {
                        let error = IngestError::partition_failure(
                            log.name(),
                            self.partition,
                            *next,
                            format!("read retries exhausted after {:?}: {e}", gate.elapsed()),
                        );
                        error!(offset = *next, error = %error, "Partition failed");
                        return PartitionOutcome::Failed(error);
                    }
                    warn!(offset = *next, error = %e, "Read failed, backing off");
                    self.metrics.inc_retries("read");
                    if gate.pause().await.is_err() {
                        return PartitionOutcome::Cancelled;
                    }
                }
                Some(Err(e)) => {
                    error!(offset = *next, error = %e, "Partition unreadable");
                    return PartitionOutcome::Failed(e);
                }
                None => {
                    if *next != *committed {
                        self.commit(log, *next, committed);
                    }
                    let end = log.end_offset(self.partition).unwrap_or(*next);
                    self.metrics.set_position(*next, end);

                    // once producers are done the end offset is final
                    if self.drain.is_cancelled() {
                        match tail.caught_up() {
                            Ok(true) => return PartitionOutcome::Drained,
                            Ok(false) => continue,
                            Err(e) if e.is_transient() => {}
                            Err(e) => return PartitionOutcome::Failed(e),
                        }
                    }

                    tokio::select! {
                        biased;
                        _ = self.token.cancelled() => return PartitionOutcome::Cancelled,
                        _ = self.drain.cancelled() => {}
                        _ = tokio::time::sleep(self.settings.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Decode and apply one record, retrying transient sink failures
    async fn process(&mut self, record: &LogRecord) -> Step {
        let message = match self.decode(record) {
            Ok(message) => message,
            Err(e) => return self.abandon(record.offset, e),
        };

        let started = Instant::now();
        let mut gate = None;
        loop {
            match self.sink.apply(&message).await {
                Ok(entity) => {
                    let latency = started.elapsed();
                    self.metrics.inc_applied(latency);
                    trace!(offset = record.offset, entity = %entity, "Record applied");
                    self.emit(ConsumerEvent::Applied {
                        partition: self.partition,
                        offset: record.offset,
                        entity,
                        latency,
                    });
                    return Step::Advance;
                }
                Err(e) if e.is_transient() => {
                    let gate =
                        gate.get_or_insert_with(|| self.settings.retry.gate(self.token.clone()));
                    if !gate.allow() {
                        let error = IngestError::partition_failure(
                            self.log.name(),
                            self.partition,
                            record.offset,
                            format!("sink retries exhausted after {:?}: {e}", gate.elapsed()),
                        );
                        return self.abandon(record.offset, error);
                    }
                    warn!(
                        offset = record.offset,
                        attempt = gate.attempts() + 1,
                        error = %e,
                        "Apply failed, backing off"
                    );
                    self.metrics.inc_retries("apply");
                    if gate.pause().await.is_err() {
                        // record stays unapplied, the cursor does not move past it
                        return Step::Cancelled;
                    }
                }
                Err(e) => return self.abandon(record.offset, IngestError::Sink(e)),
            }
        }
    }

    /// Decode with the codec that wrote the record
    fn decode(&self, record: &LogRecord) -> Result<Message, IngestError> {
        let corrupt = |message: String| {
            IngestError::corrupt_record(self.log.name(), self.partition, record.offset, message)
        };
        let codec = self
            .settings
            .codecs
            .by_id(record.codec_id)
            .map_err(|e| corrupt(e.to_string()))?;
        codec.decode(&record.payload).map_err(|e| corrupt(e.to_string()))
    }

    fn abandon(&mut self, offset: Offset, error: IngestError) -> Step {
        let policy = self.settings.failure_policy;
        self.metrics.inc_failures(error.kind());
        error!(offset, policy = ?policy, error = %error, "Record abandoned");

        let report = FailureReport::new(self.log.name(), self.partition, offset, &error, policy);
        self.emit(ConsumerEvent::Failed(report));

        match policy {
            FailurePolicy::Skip => {
                self.metrics.inc_skipped();
                Step::Advance
            }
            FailurePolicy::Halt => Step::Halt,
        }
    }

    fn commit(&self, log: &dyn Log, next: Offset, committed: &mut Offset) {
        match log.commit(&self.settings.group, self.partition, next) {
            Ok(()) => {
                debug!(offset = next, "Cursor committed");
                *committed = next;
            }
            // kept uncommitted, retried with the next batch or on exit
            Err(e) => warn!(offset = next, error = %e, "Cursor commit failed"),
        }
    }

    fn emit(&self, event: ConsumerEvent) {
        if self.events.send(event).is_err() {
            trace!("Event receiver closed");
        }
    }

    fn summary(&self, outcome: PartitionOutcome, committed: Offset) -> PartitionSummary {
        PartitionSummary {
            partition: self.partition,
            outcome,
            committed,
            metrics: self.metrics.snapshot(),
        }
    }
}
