use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AmosError {
    #[error("String '{id}' already exists in component {component}")]
    DuplicateStringId { component: String, id: String },

    #[error("Invalid version code: {0} (expected two digits like 39 or three like 401)")]
    InvalidVersionCode(String),

    #[error("Invalid branch name: {0} (expected MOODLE_XY_STABLE, main or master)")]
    InvalidBranchName(String),

    #[error("Invalid version directory: {0} (expected major.minor like 4.1)")]
    InvalidDirectory(String),

    #[error("Version {0} is not registered")]
    UnknownVersion(i32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Components do not match: {0}")]
    ComponentMismatch(String),

    #[error("Commit failed and was rolled back: {0}")]
    CommitFailed(#[source] StorageError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AmosError {
    /// Whether a rebase followed by another commit attempt may succeed.
    pub fn is_commit_conflict(&self) -> bool {
        matches!(self, AmosError::CommitFailed(StorageError::Conflict { .. }))
    }
}

pub type Result<T> = std::result::Result<T, AmosError>;
