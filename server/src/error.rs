//! Error taxonomy shared by every storage and tree operation.
//!
//! Validation errors are recoverable by the caller and carry user-facing
//! messages. Storage, configuration and database errors are operational:
//! callers surface them, but they are logged at error level first.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, FileManagerError>;

#[derive(Error, Debug)]
pub enum FileManagerError {
    #[error("a node named '{0}' already exists in this folder")]
    DuplicateName(String),
    #[error("a folder cannot be moved into itself or one of its descendants")]
    CyclicMove,
    #[error("upload is incomplete: {0}")]
    IncompleteUpload(String),
    #[error("file extension '{0}' is not allowed")]
    DisallowedExtension(String),
    #[error("storage I/O failed: {0}")]
    StorageWrite(#[from] std::io::Error),
    #[error("node not found: {0}")]
    NodeNotFound(Uuid),
    #[error("node is not a folder: {0}")]
    NotAFolder(Uuid),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for FileManagerError {
    fn from(err: sqlx::Error) -> Self {
        FileManagerError::Database(err.into())
    }
}

impl FileManagerError {
    /// Operational failures need operator attention; everything else is the
    /// caller's to fix.
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            FileManagerError::StorageWrite(_)
                | FileManagerError::Configuration(_)
                | FileManagerError::Database(_)
        )
    }
}
