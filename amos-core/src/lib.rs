pub mod backport;
pub mod config;
pub mod diff;
pub mod error;
pub mod logger;
pub mod merge;
pub mod model;
pub mod script;
pub mod snapshot;
pub mod stage;
pub mod stash;
pub mod storage;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AmosError, Result};
pub use model::{Component, ComponentKey, InsertPolicy, LangString};
pub use snapshot::{SnapshotOptions, from_snapshot};
pub use stage::{CommitMeta, CommitOptions, PersistentStage, RebaseOptions, RetryPolicy, Stage};
pub use stash::{Stash, StashPool};
pub use storage::{CommitSource, HistoryStore};
pub use version::{Version, VersionRegistry};

/// Language code of the English source strings.
pub const ENGLISH: &str = "en";

/// Pseudo-language holding English corrections, never treated as a translation.
pub const FIX_LANGUAGE: &str = "en_fix";

/// Current unix timestamp in seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
