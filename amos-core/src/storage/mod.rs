mod blob;
mod history;
mod journal;
mod memory;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use history::{
    CommitId, CommitRecord, CommitSource, HistoryQuery, HistoryRecord, HistoryStore,
    HistoryTransaction, NewCommit, NewRecord, RecordId,
};
pub use journal::JournalHistory;
pub use memory::MemoryHistory;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage corrupted: {0}")]
    Corrupted(String),

    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("Transaction has no commit envelope")]
    MissingEnvelope,

    #[error("Concurrent commit detected: rebased against {base}, repository head is {head}")]
    Conflict { base: CommitId, head: CommitId },

    #[error("Injected failure: {0}")]
    Injected(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
