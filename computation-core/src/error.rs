//! Core error types for the local computation engine

use thiserror::Error;

/// Result type alias for computation operations
pub type ComputationResult<T> = std::result::Result<T, ComputationError>;

/// Errors raised while configuring the engine or running a batch.
///
/// A nonzero exit code is not an error: it is recorded as an
/// [`ExecutionError`](crate::ExecutionError) in the batch report.
#[derive(Debug, Error)]
pub enum ComputationError {
    /// No process runner exists for the host operating system
    #[error("OS not supported for local execution: {0}")]
    UnsupportedPlatform(String),

    /// A declared input is in neither the working nor the common directory
    #[error("Input file '{0}' not found in the working and common directory")]
    MissingInputFile(String),

    /// I/O failure while copying, decompressing or compressing a staged file
    #[error("Failed to stage file '{file}': {source}")]
    Staging {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// An input archive could not be read
    #[error("Failed to extract archive '{file}': {message}")]
    Archive { file: String, message: String },

    /// A program could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported file preprocessor: {0}")]
    UnsupportedPreprocessor(String),

    #[error("Unsupported file postprocessor: {0}")]
    UnsupportedPostprocessor(String),

    /// A command could not be built
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The batch was cancelled before or while running
    #[error("Execution cancelled")]
    Cancelled,

    /// Invalid or unreadable engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure raised by a caller-supplied execution handler
    #[error("Execution handler error: {0}")]
    Handler(#[from] anyhow::Error),

    /// The worker pool could not run or join a batch
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComputationError {
    /// Wrap an I/O error raised while staging `file`
    pub fn staging(file: impl Into<String>, source: std::io::Error) -> Self {
        Self::Staging {
            file: file.into(),
            source,
        }
    }

    /// Whether this error is the cancellation outcome rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_message_names_file() {
        let err = ComputationError::MissingInputFile("network.xiidm".to_string());
        assert_eq!(
            err.to_string(),
            "Input file 'network.xiidm' not found in the working and common directory"
        );
    }

    #[test]
    fn test_staging_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ComputationError::staging("case.gz", io);
        assert!(err.to_string().contains("case.gz"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(ComputationError::Cancelled.is_cancelled());
        assert!(!ComputationError::WorkerPool("gone".to_string()).is_cancelled());
    }
}
