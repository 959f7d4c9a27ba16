//! Path manager error types

use thiserror::Error;

/// Error type for path registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A path with this name is already registered
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// No path with this name
    #[error("path not found: {0}")]
    NotFound(String),

    /// The path already has an active publisher
    #[error("path already has a publisher: {0}")]
    AlreadyPublishing(String),

    /// Name is empty or contains characters unusable in URLs
    #[error("invalid path name: {0:?}")]
    InvalidName(String),

    /// The manager was shut down
    #[error("path manager is shut down")]
    ShuttingDown,
}
