use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sort and merge-purge operations
pub type Result<T> = std::result::Result<T, SortError>;

/// Error types surfaced by the sort and merge-purge engines
#[derive(Error, Debug)]
pub enum SortError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("The source file, {} , does not exist", .0.display())]
    SourceNotFound(PathBuf),

    #[error("The destination folder, {} , does not exist", .0.display())]
    DestinationNotFound(PathBuf),

    #[error("Malformed line {line_number}: {reason} Field ({field_index})")]
    MalformedLine {
        line_number: usize,
        field_index: usize,
        reason: String,
    },

    #[error("Key mismatch on line {line_number}: {message}")]
    KeyMismatch { line_number: usize, message: String },

    #[error("Operation aborted by callback: {0}")]
    Callback(String),

    #[error("Staging store error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Payload codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Coarse error taxonomy for callers that only care about the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input detected before any I/O took place
    Argument,
    /// A source line could not be tokenized or keyed
    Format,
    /// Failure reading, writing or encoding data
    Storage,
    /// A caller-supplied function asked to stop
    Callback,
}

impl SortError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SortError::InvalidArgument(_)
            | SortError::SourceNotFound(_)
            | SortError::DestinationNotFound(_) => ErrorKind::Argument,
            SortError::MalformedLine { .. } | SortError::KeyMismatch { .. } => ErrorKind::Format,
            SortError::Callback(_) => ErrorKind::Callback,
            SortError::Storage(_)
            | SortError::Codec(_)
            | SortError::Io(_)
            | SortError::Serialization(_)
            | SortError::Task(_) => ErrorKind::Storage,
        }
    }

    /// Builds the error a caller-supplied function returns to abort the operation.
    pub fn aborted(message: impl Into<String>) -> Self {
        SortError::Callback(message.into())
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SortError::InvalidArgument(message.into())
    }
}
