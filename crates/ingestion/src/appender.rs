//! LogAppender - encode, route and append with retry

use std::sync::Arc;

use codec::Codec;
use contracts::{IngestError, Message, Offset};
use logstore::Log;
use retry::RetrySettings;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::metrics::ProducerMetrics;

/// Appends messages to one log.
///
/// Shared by every branch worker; each append owns its own retry state.
pub struct LogAppender {
    log: Arc<dyn Log>,
    codec: Arc<dyn Codec>,
    retry: RetrySettings,
    token: CancellationToken,
    metrics: Arc<ProducerMetrics>,
}

impl LogAppender {
    pub fn new(
        log: Arc<dyn Log>,
        codec: Arc<dyn Codec>,
        retry: RetrySettings,
        token: CancellationToken,
    ) -> Self {
        Self {
            log,
            codec,
            retry,
            token,
            metrics: Arc::new(ProducerMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<ProducerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn log(&self) -> &Arc<dyn Log> {
        &self.log
    }

    pub fn partitions(&self) -> u32 {
        self.log.partitions()
    }

    pub fn metrics(&self) -> &Arc<ProducerMetrics> {
        &self.metrics
    }

    /// Append `message` to `partition`.
    ///
    /// `TransientIo` is retried while the retry budget lasts, then escalated
    /// to `PartitionFailure`. Every other error is returned as is.
    #[instrument(
        name = "log_append",
        skip(self, message),
        fields(log = %self.log.name(), kind = message.kind())
    )]
    pub async fn append(&self, partition: u32, message: &Message) -> Result<Offset, IngestError> {
        let payload = self
            .codec
            .encode(message)
            .map_err(|e| IngestError::Other(e.to_string()))?;

        let mut gate = None;
        loop {
            let error = match self.log.append(partition, self.codec.id(), &payload) {
                Ok(offset) => {
                    self.metrics.record_appended();
                    metrics::counter!(
                        "bulk_ingest_records_appended_total",
                        "log" => self.log.name().to_string(),
                        "partition" => partition.to_string()
                    )
                    .increment(1);
                    return Ok(offset);
                }
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e),
            };

            let gate = gate.get_or_insert_with(|| self.retry.gate(self.token.clone()));
            if !gate.allow() {
                let offset = self.log.end_offset(partition).unwrap_or_default();
                return Err(IngestError::partition_failure(
                    self.log.name(),
                    partition,
                    offset,
                    format!("append retries exhausted after {:?}: {error}", gate.elapsed()),
                ));
            }

            warn!(
                partition,
                attempt = gate.attempts() + 1,
                error = %error,
                "Append failed, backing off"
            );
            self.metrics.record_retry();
            gate.pause().await?;
        }
    }
}
