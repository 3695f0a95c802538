//! LogSink - logs applied messages via tracing

use contracts::{EntityId, Message, MessageSink, SinkError};
use tracing::{info, instrument};

use super::entity_id;

/// Sink that only logs a summary of each message, for dry runs
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
    applied: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied: 0,
        }
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    fn log_message_summary(&self, message: &Message, entity: &EntityId) {
        match message {
            Message::Blob(blob) => info!(
                sink = %self.name,
                entity = %entity,
                length = blob.content.len(),
                mime_type = ?blob.mime_type,
                "Blob received"
            ),
            Message::BlobInfo(blob_info) => info!(
                sink = %self.name,
                entity = %entity,
                length = blob_info.length,
                digest = %blob_info.digest,
                "Blob info received"
            ),
            Message::Document(doc) => info!(
                sink = %self.name,
                entity = %entity,
                doc_type = %doc.doc_type,
                properties = doc.properties.len(),
                has_blob = doc.blob.is_some(),
                "Document received"
            ),
        }
    }
}

impl MessageSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_apply",
        skip(self, message),
        fields(sink = %self.name, kind = message.kind())
    )]
    async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError> {
        let entity = entity_id(message);
        self.log_message_summary(message, &entity);
        self.applied += 1;
        Ok(entity)
    }

    #[instrument(name = "log_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), SinkError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), SinkError> {
        info!(sink = %self.name, applied = self.applied, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::BlobInfoMessage;

    #[tokio::test]
    async fn test_log_sink_apply() {
        let mut sink = LogSink::new("test_log");
        let message = Message::BlobInfo(BlobInfoMessage {
            key: "abc".into(),
            digest: "abc".into(),
            length: 3,
            mime_type: None,
            encoding: None,
            filename: None,
        });

        let entity = sink.apply(&message).await.unwrap();
        assert_eq!(entity, "blobinfo:abc");
        assert_eq!(sink.applied(), 1);
    }

    #[tokio::test]
    async fn test_log_sink_name() {
        let sink = LogSink::new("my_logger");
        assert_eq!(sink.name(), "my_logger");
    }
}
