//! Error types for the frame proxy.

use thiserror::Error;

/// Media cache errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported mime type for storage: {0}")]
    UnsupportedMimeType(String),

    #[error("Invalid artifact id: {0}")]
    InvalidId(String),

    #[error("Indexed store requires a source URL")]
    MissingSourceUrl,

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// How an error should be surfaced at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The caller sent something malformed
    Client,
    /// The target (or this service) could not produce a result right now
    Unavailable,
    /// Unexpected internal failure; detail is not exposed
    Internal,
}

/// Errors produced while resolving a frame job
#[derive(Debug, Clone, Error)]
pub enum FrameError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("Unrecognized content: {0}")]
    UnrecognizedContent(String),

    #[error("Invalid frame content: {0}")]
    InvalidFrameContent(String),

    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Frame queue is full ({0} pending)")]
    QueueFull(usize),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Frame queue stopped before the job completed")]
    QueueStopped,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FrameError {
    pub fn status_class(&self) -> StatusClass {
        match self {
            FrameError::InvalidInput(_) | FrameError::UnknownJob(_) => StatusClass::Client,
            FrameError::RemoteFetch(_)
            | FrameError::UnrecognizedContent(_)
            | FrameError::InvalidFrameContent(_)
            | FrameError::ImageUnavailable(_)
            | FrameError::QueueFull(_)
            | FrameError::QueueStopped => StatusClass::Unavailable,
            FrameError::Storage(_) | FrameError::ConfigError(_) | FrameError::Internal(_) => {
                StatusClass::Internal
            }
        }
    }
}

impl From<StorageError> for FrameError {
    fn from(err: StorageError) -> Self {
        FrameError::Storage(err.to_string())
    }
}

impl From<config::ConfigError> for FrameError {
    fn from(err: config::ConfigError) -> Self {
        FrameError::ConfigError(err.to_string())
    }
}
