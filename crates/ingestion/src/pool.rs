//! ProducerPool - runs branch workers as the fork policy allows

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use contracts::{IngestError, LogKind, ProducerIterator, SourceNode};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::appender::LogAppender;
use crate::fork::{AdaptiveForkPolicy, ForkPolicy};
use crate::metrics::{ProducerMetrics, ProducerReport};
use crate::producer::{Branch, ForkContext, TreeProducer};

/// Builder for a [`ProducerPool`]
pub struct ProducerPoolBuilder {
    appender: Arc<LogAppender>,
    policy: Arc<dyn ForkPolicy>,
    batch_size: u64,
    kind: LogKind,
    target_root: String,
    token: CancellationToken,
}

impl ProducerPoolBuilder {
    pub fn new(appender: LogAppender) -> Self {
        Self {
            appender: Arc::new(appender),
            policy: Arc::new(AdaptiveForkPolicy::default()),
            batch_size: 50,
            kind: LogKind::default(),
            target_root: "/".to_string(),
            token: CancellationToken::new(),
        }
    }

    pub fn fork_policy(mut self, policy: Arc<dyn ForkPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Which messages walkers emit
    pub fn log_kind(mut self, kind: LogKind) -> Self {
        self.kind = kind;
        self
    }

    /// Target path the source root maps to
    pub fn target_root(mut self, target_root: impl Into<String>) -> Self {
        self.target_root = target_root.into();
        self
    }

    /// Pipeline cancellation: stops forking and walking
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn build(self) -> ProducerPool {
        let (forks_tx, forks_rx) = async_channel::unbounded();
        ProducerPool {
            metrics: self.appender.metrics().clone(),
            appender: self.appender,
            policy: self.policy,
            batch_size: self.batch_size,
            kind: self.kind,
            target_root: self.target_root,
            token: self.token,
            forks_tx,
            forks_rx,
        }
    }
}

/// Adaptive pool of tree walkers feeding one log
pub struct ProducerPool {
    appender: Arc<LogAppender>,
    policy: Arc<dyn ForkPolicy>,
    batch_size: u64,
    kind: LogKind,
    target_root: String,
    token: CancellationToken,
    metrics: Arc<ProducerMetrics>,
    forks_tx: Sender<Branch>,
    forks_rx: Receiver<Branch>,
}

impl ProducerPool {
    pub fn metrics(&self) -> &Arc<ProducerMetrics> {
        &self.metrics
    }

    /// Walk `root` to completion.
    ///
    /// Unreadable nodes and payloads too large for the log are counted as
    /// aborts; their siblings are still produced. The first append failure
    /// stops every worker and is returned after all of them finished.
    #[instrument(
        name = "producer_pool_run",
        skip(self, root),
        fields(log = %self.appender.log().name(), policy = self.policy.name())
    )]
    pub async fn run(self, root: Arc<dyn SourceNode>) -> Result<ProducerReport, IngestError> {
        info!(
            source = root.source_path(),
            batch_size = self.batch_size,
            "Producer pool started"
        );

        // stops workers on append failure without cancelling the pipeline
        let stop = self.token.child_token();
        let fork = ForkContext {
            policy: self.policy.clone(),
            batch_size: self.batch_size,
            metrics: self.metrics.clone(),
            forks: self.forks_tx.clone(),
            token: stop.clone(),
        };

        let mut tasks = JoinSet::new();
        self.metrics.schedule();
        let root_walker = TreeProducer::import(root, self.target_root.clone(), self.kind)
            .with_fork(fork.clone());
        tasks.spawn(walk(root_walker, self.appender.clone(), stop.clone()));

        let mut failure = None;
        loop {
            tokio::select! {
                biased;
                Ok(branch) = self.forks_rx.recv() => {
                    debug!(?branch, "Spawning branch worker");
                    let walker = TreeProducer::branch(branch, self.kind).with_fork(fork.clone());
                    tasks.spawn(walk(walker, self.appender.clone(), stop.clone()));
                }
                Some(joined) = tasks.join_next() => {
                    self.metrics.unschedule();
                    match joined {
                        Ok(Ok(())) | Ok(Err(IngestError::Cancelled)) => {}
                        Ok(Err(e)) => {
                            error!(error = %e, "Branch failed, stopping producers");
                            stop.cancel();
                            failure.get_or_insert(e);
                        }
                        Err(e) => {
                            error!(error = %e, "Branch worker panicked");
                            stop.cancel();
                            failure.get_or_insert(IngestError::Other(e.to_string()));
                        }
                    }
                }
                else => break,
            }

            if tasks.is_empty() && self.forks_rx.is_empty() {
                break;
            }
        }

        // branches forked after a stop are dropped unwalked
        while let Ok(branch) = self.forks_rx.try_recv() {
            debug!(?branch, "Discarding pending branch");
            self.metrics.unschedule();
        }

        let mut report = self.metrics.snapshot();
        report.cancelled = self.token.is_cancelled();
        info!(
            produced = report.produced,
            appended = report.appended,
            forks = report.forks,
            aborts = report.aborts,
            cancelled = report.cancelled,
            "Producer pool finished"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

/// One branch worker: drain the walker into the log.
///
/// A node that cannot be produced is skipped with its subtree; the worker
/// keeps walking. Any other error ends it.
async fn walk(
    mut walker: TreeProducer,
    appender: Arc<LogAppender>,
    stop: CancellationToken,
) -> Result<(), IngestError> {
    let partitions = appender.partitions();
    while let Some(item) = walker.next() {
        if stop.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        let message = match item {
            Ok(message) => message,
            Err(IngestError::ProducerAbort { node, message }) => {
                appender.metrics().record_abort();
                warn!(node, message, "Node unreadable, siblings continue");
                continue;
            }
            Err(e) => return Err(e),
        };

        let partition = walker.partition_of(&message, partitions);
        match appender.append(partition, &message).await {
            Ok(_) => {}
            Err(e @ IngestError::InvalidPayload { .. }) => {
                appender.metrics().record_abort();
                warn!(key = %message.key(), error = %e, "Message too large, skipped");
            }
            Err(e) => return Err(e),
        }
        // other workers get a turn between appends
        tokio::task::yield_now().await;
    }
    Ok(())
}
