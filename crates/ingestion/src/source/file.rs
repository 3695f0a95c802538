//! FileSourceNode - local directory tree

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use contracts::{IngestError, SourceBlob, SourceNode};

use super::guess_mime_type;

/// Filesystem entry; directories are folderish, files carry a blob
#[derive(Debug, Clone)]
pub struct FileSourceNode {
    path: PathBuf,
    name: String,
    source_path: String,
    is_dir: bool,
}

impl FileSourceNode {
    /// Root of an import
    ///
    /// # Errors
    /// `ProducerAbort` when the path cannot be inspected
    pub fn root(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        Self::new(path.as_ref().to_path_buf())
    }

    fn new(path: PathBuf) -> Result<Self, IngestError> {
        let source_path = path.display().to_string();
        let metadata = fs::metadata(&path)
            .map_err(|e| IngestError::producer_abort(&source_path, e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_path.clone());

        Ok(Self {
            is_dir: metadata.is_dir(),
            path,
            name,
            source_path,
        })
    }
}

impl SourceNode for FileSourceNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_path(&self) -> &str {
        &self.source_path
    }

    fn is_folderish(&self) -> bool {
        self.is_dir
    }

    fn children(&self) -> Result<Vec<Arc<dyn SourceNode>>, IngestError> {
        if !self.is_dir {
            return Ok(Vec::new());
        }
        let abort = |e: std::io::Error| IngestError::producer_abort(&self.source_path, e.to_string());

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(abort)? {
            paths.push(entry.map_err(abort)?.path());
        }
        paths.sort();

        paths
            .into_iter()
            .map(|path| Self::new(path).map(|node| Arc::new(node) as Arc<dyn SourceNode>))
            .collect()
    }

    fn blob(&self) -> Result<Option<SourceBlob>, IngestError> {
        if self.is_dir {
            return Ok(None);
        }
        let content = fs::read(&self.path)
            .map_err(|e| IngestError::producer_abort(&self.source_path, e.to_string()))?;

        Ok(Some(SourceBlob {
            filename: self.name.clone(),
            mime_type: guess_mime_type(&self.name).map(str::to_string),
            encoding: None,
            content: Bytes::from(content),
        }))
    }
}
