use std::sync::Arc;

use anyhow::{Context, Result};

use amos_core::config::ConfigEntity;
use amos_core::storage::{FsBlobStore, JournalHistory};
use amos_core::{StashPool, Version, VersionRegistry};

/// Everything a command needs, opened from the configuration.
pub struct Repo {
    pub config: &'static ConfigEntity,
    pub registry: VersionRegistry,
    pub history: JournalHistory,
    pub blobs: Arc<FsBlobStore>,
}

impl Repo {
    pub fn open(config: &'static ConfigEntity) -> Result<Self> {
        let registry = VersionRegistry::from_config(config)?;
        let history = JournalHistory::open(config.journal_path())
            .with_context(|| format!("cannot open history at {}", config.journal_path().display()))?;
        let blobs = Arc::new(FsBlobStore::new(config.blob_root())?);
        Ok(Self {
            config,
            registry,
            history,
            blobs,
        })
    }

    pub fn stash_pool(&self) -> StashPool {
        StashPool::new(self.blobs.clone())
    }

    /// Accepts a code (`401`), a directory (`4.1`) or a branch name.
    pub fn version(&self, name: &str) -> Result<Version> {
        let version = if let Ok(code) = name.parse::<i32>() {
            self.registry.by_code(code)?
        } else if name.contains('.') {
            self.registry.by_directory(name)?
        } else {
            self.registry.by_branch_name(name)?
        };
        Ok(version)
    }
}

pub fn format_time(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
