//! Source trees

mod file;
mod synthetic;

use std::sync::Arc;

use contracts::{IngestError, SourceConfig, SourceNode};

pub use file::FileSourceNode;
pub use synthetic::SyntheticSourceNode;

/// Root node for a configured source
pub fn source_root(config: &SourceConfig) -> Result<Arc<dyn SourceNode>, IngestError> {
    match config {
        SourceConfig::Filesystem { path } => Ok(Arc::new(FileSourceNode::root(path)?)),
        SourceConfig::Synthetic {
            fan_out,
            depth,
            blob_size,
        } => Ok(Arc::new(SyntheticSourceNode::root(
            *fan_out, *depth, *blob_size,
        ))),
    }
}

/// MIME type guessed from a file extension
pub(crate) fn guess_mime_type(filename: &str) -> Option<&'static str> {
    let (_, ext) = filename.rsplit_once('.')?;
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(mime)
}
