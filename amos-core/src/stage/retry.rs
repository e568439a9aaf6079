use tracing::{instrument, warn};

use super::{CommitMeta, CommitOptions, RebaseOptions, Stage};
use crate::config::ConfigEntity;
use crate::error::Result;
use crate::storage::{CommitId, HistoryStore};

/// How many times a rebase+commit may be attempted when another commit
/// lands in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(cfg: &ConfigEntity) -> Self {
        Self::new(cfg.commit_retries)
    }
}

impl Stage {
    /// Rebase then commit, starting over when the repository moved under
    /// the stage in between. Only conflicts are retried.
    #[instrument(skip_all, fields(max_attempts = policy.max_attempts))]
    pub fn commit_with_retry(
        &mut self,
        store: &dyn HistoryStore,
        message: &str,
        meta: &CommitMeta,
        policy: RetryPolicy,
    ) -> Result<Option<CommitId>> {
        let options = CommitOptions {
            skip_rebase: true,
            ..Default::default()
        };
        let mut attempt = 1;
        loop {
            self.rebase(store, &RebaseOptions::default())?;
            match self.commit(store, message, meta, &options) {
                Err(err) if err.is_commit_conflict() && attempt < policy.max_attempts => {
                    warn!(attempt, error = %err, "commit raced with another writer, rebasing again");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}
