//! Sink implementations
//!
//! Contains LogSink, DirectorySink and MemorySink, plus the factory that
//! builds them from a `SinkConfig`.

mod directory;
mod log;
mod memory;

pub use self::directory::{DirectorySink, DirectorySinkConfig};
pub use self::log::LogSink;
pub use self::memory::MemorySink;

use contracts::{EntityId, IngestError, Message, MessageSink, SinkConfig, SinkError, SinkType};
use tracing::instrument;

/// Entity a message creates or updates
pub fn entity_id(message: &Message) -> EntityId {
    match message {
        Message::Blob(blob) => EntityId::blob(&blob.key),
        Message::BlobInfo(info) => EntityId::blob_info(&info.key),
        Message::Document(doc) => EntityId::document(&doc.path()),
    }
}

/// Any sink selectable from configuration
#[derive(Debug, Clone)]
pub enum ConfiguredSink {
    Log(LogSink),
    Directory(DirectorySink),
    Memory(MemorySink),
}

impl MessageSink for ConfiguredSink {
    fn name(&self) -> &str {
        match self {
            Self::Log(sink) => sink.name(),
            Self::Directory(sink) => sink.name(),
            Self::Memory(sink) => sink.name(),
        }
    }

    async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError> {
        match self {
            Self::Log(sink) => sink.apply(message).await,
            Self::Directory(sink) => sink.apply(message).await,
            Self::Memory(sink) => sink.apply(message).await,
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        match self {
            Self::Log(sink) => sink.flush().await,
            Self::Directory(sink) => sink.flush().await,
            Self::Memory(sink) => sink.flush().await,
        }
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        match self {
            Self::Log(sink) => sink.close().await,
            Self::Directory(sink) => sink.close().await,
            Self::Memory(sink) => sink.close().await,
        }
    }
}

/// Builds one sink per partition worker.
///
/// Workers get clones of one prototype: memory sinks then share a store
/// and directory sinks share a base path.
#[derive(Debug, Clone)]
pub struct SinkFactory {
    prototype: ConfiguredSink,
}

impl SinkFactory {
    /// Create the prototype sink; fails if its resources cannot be set up
    #[instrument(
        name = "sink_factory_from_config",
        skip(config),
        fields(sink = %config.name, sink_type = ?config.sink_type)
    )]
    pub fn from_config(config: &SinkConfig) -> Result<Self, IngestError> {
        let prototype = match config.sink_type {
            SinkType::Log => ConfiguredSink::Log(LogSink::new(&config.name)),
            SinkType::Directory => ConfiguredSink::Directory(
                DirectorySink::from_params(&config.name, &config.params).map_err(|e| {
                    IngestError::config_validation(
                        "sink.params.base_path",
                        format!("cannot prepare directory sink '{}': {e}", config.name),
                    )
                })?,
            ),
            SinkType::Memory => ConfiguredSink::Memory(MemorySink::new(&config.name)),
        };
        Ok(Self { prototype })
    }

    pub fn from_sink(prototype: ConfiguredSink) -> Self {
        Self { prototype }
    }

    /// Sink for the worker of `partition`
    pub fn make(&self, _partition: u32) -> Result<ConfiguredSink, IngestError> {
        Ok(self.prototype.clone())
    }

    /// Shared store behind a memory sink
    pub fn memory(&self) -> Option<&MemorySink> {
        match &self.prototype {
            ConfiguredSink::Memory(sink) => Some(sink),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(sink_type: SinkType, params: HashMap<String, String>) -> SinkConfig {
        SinkConfig {
            name: "repo".to_string(),
            sink_type,
            params,
        }
    }

    #[tokio::test]
    async fn test_memory_factory_shares_store() {
        let factory = SinkFactory::from_config(&config(SinkType::Memory, HashMap::new())).unwrap();
        let mut a = factory.make(0).unwrap();
        let mut b = factory.make(1).unwrap();

        let doc = Message::Document(contracts::DocumentMessage {
            doc_type: "Folder".into(),
            parent_path: "/".into(),
            name: "docs".into(),
            properties: Default::default(),
            blob: None,
        });
        assert_eq!(a.apply(&doc).await.unwrap(), "doc:/docs");
        b.apply(&doc).await.unwrap();

        let store = factory.memory().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.applies(), 2);
        assert_eq!(a.name(), "repo");
    }

    #[test]
    fn test_directory_factory_creates_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("repo");
        let params = HashMap::from([(
            "base_path".to_string(),
            base.to_string_lossy().to_string(),
        )]);

        let factory = SinkFactory::from_config(&config(SinkType::Directory, params)).unwrap();
        assert!(matches!(factory.make(0).unwrap(), ConfiguredSink::Directory(_)));
        assert!(base.join("documents").is_dir());
    }
}
