//! DirectorySink - writes entities to disk with folder structure

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use contracts::{EntityId, Message, MessageSink, SinkError};
use tracing::{debug, instrument};

use super::entity_id;

/// Configuration for DirectorySink
#[derive(Debug, Clone)]
pub struct DirectorySinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
}

impl DirectorySinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./repository"));

        Self { base_path }
    }
}

/// Sink that stores entities as files.
///
/// Layout under `base_path`:
/// - `documents/<document path>.json`
/// - `blobs/<key>` (content) and `blobs/<key>.json` (blob info)
///
/// Files are overwritten, so re-applying a message is harmless.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    name: String,
    config: DirectorySinkConfig,
    created_dirs: HashSet<PathBuf>,
}

impl DirectorySink {
    /// Create a new DirectorySink
    pub fn new(name: impl Into<String>, config: DirectorySinkConfig) -> std::io::Result<Self> {
        fs::create_dir_all(config.base_path.join("documents"))?;
        fs::create_dir_all(config.base_path.join("blobs"))?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        Self::new(name, DirectorySinkConfig::from_params(params))
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// File an entity is stored in
    fn target(&self, message: &Message) -> Result<PathBuf, SinkError> {
        let path = match message {
            Message::Blob(blob) => self.config.base_path.join("blobs").join(self.component(&blob.key)?),
            Message::BlobInfo(info) => self
                .config
                .base_path
                .join("blobs")
                .join(format!("{}.json", self.component(&info.key)?)),
            Message::Document(doc) => {
                let mut path = self.config.base_path.join("documents");
                let full = doc.path();
                let mut parts = full.split('/').filter(|p| !p.is_empty()).peekable();
                while let Some(part) = parts.next() {
                    let part = self.component(part)?;
                    if parts.peek().is_some() {
                        path.push(part);
                    } else {
                        path.push(format!("{part}.json"));
                    }
                }
                path
            }
        };
        Ok(path)
    }

    /// Reject names that would escape the base directory
    fn component<'a>(&self, part: &'a str) -> Result<&'a str, SinkError> {
        if part.is_empty() || part == "." || part == ".." || part.contains('/') || part.contains('\\') {
            return Err(SinkError::rejected(
                &self.name,
                format!("invalid path component '{part}'"),
            ));
        }
        Ok(part)
    }

    fn write_entity(&mut self, message: &Message) -> Result<PathBuf, SinkError> {
        let path = self.target(message)?;
        if let Some(dir) = path.parent() {
            if !self.created_dirs.contains(dir) {
                fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
                self.created_dirs.insert(dir.to_path_buf());
            }
        }

        let bytes = match message {
            Message::Blob(blob) => blob.content.to_vec(),
            Message::BlobInfo(info) => serde_json::to_vec_pretty(info)
                .map_err(|e| SinkError::rejected(&self.name, e.to_string()))?,
            Message::Document(doc) => serde_json::to_vec_pretty(doc)
                .map_err(|e| SinkError::rejected(&self.name, e.to_string()))?,
        };
        fs::write(&path, bytes).map_err(|e| self.io_error(e))?;
        Ok(path)
    }

    fn io_error(&self, error: std::io::Error) -> SinkError {
        match error.kind() {
            ErrorKind::PermissionDenied | ErrorKind::InvalidInput => {
                SinkError::rejected(&self.name, error.to_string())
            }
            _ => SinkError::transient(&self.name, error.to_string()),
        }
    }
}

impl MessageSink for DirectorySink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "directory_sink_apply",
        skip(self, message),
        fields(sink = %self.name, kind = message.kind())
    )]
    async fn apply(&mut self, message: &Message) -> Result<EntityId, SinkError> {
        let path = self.write_entity(message)?;
        debug!(path = %path.display(), "Entity written");
        Ok(entity_id(message))
    }

    #[instrument(name = "directory_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    #[instrument(name = "directory_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), SinkError> {
        debug!(sink = %self.name, "DirectorySink closed");
        Ok(())
    }
}
