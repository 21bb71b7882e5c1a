//! Error types for storage operations.

use protocol::{ErrorKind, ErrorMessage};
use thiserror::Error;

/// Failure of a single storage operation.
///
/// `NotFound` deliberately carries no path: a hash that decodes outside the
/// volume and a hash naming a missing file must be indistinguishable.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The hash does not name an accepted, existing node.
    #[error("file not found")]
    NotFound,

    /// The node exists but fails a permission check or the operation is disabled.
    #[error("access denied")]
    AccessDenied,

    /// A symbolic link target cannot be resolved inside the volume.
    #[error("broken link")]
    BrokenLink,

    /// The node has the wrong kind for the operation, or a name is invalid.
    #[error("invalid parameters")]
    InvalidParameters,

    /// The volume failed its construction-time validation.
    #[error("storage unavailable")]
    Unavailable,

    /// The target of a create or copy already exists.
    #[error("file already exists")]
    AlreadyExists,

    /// The backend failed while performing I/O.
    ///
    /// Only the error kind is displayed; backend messages may carry paths.
    #[error("IO error: {}", .0.kind())]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Wire error kind for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound => ErrorKind::NotFound,
            StorageError::AccessDenied => ErrorKind::AccessDenied,
            StorageError::BrokenLink => ErrorKind::BrokenLink,
            StorageError::InvalidParameters => ErrorKind::InvalidParameters,
            StorageError::Unavailable => ErrorKind::Unavailable,
            StorageError::AlreadyExists => ErrorKind::AlreadyExists,
            StorageError::Io(_) => ErrorKind::Io,
        }
    }

    /// Client-facing error record. I/O details are not forwarded.
    pub fn to_message(&self) -> ErrorMessage {
        ErrorMessage::new(self.kind())
    }
}
