//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Command needs a backend the configuration does not use
    #[error("`{command}` requires the {expected} log backend")]
    UnsupportedBackend {
        command: &'static str,
        expected: &'static str,
    },

    /// Run ended with halted or failed partitions under `fail_pipeline`
    #[error("Pipeline failed: partitions {partitions:?} did not drain")]
    PartitionsHalted { partitions: Vec<u32> },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
