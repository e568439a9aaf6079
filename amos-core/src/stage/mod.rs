//! Staging area: pending edits waiting to be rebased and committed.
//!
//! A [`Stage`] holds deep copies of the components a user edits, keyed by
//! [`ComponentKey::id`](crate::ComponentKey::id). `rebase` filters it down
//! to the strings that still change something in the repository and
//! `commit` appends those strings as one atomic history transaction.

pub mod codec;
mod persistent;
mod retry;

pub use persistent::PersistentStage;
pub use retry::RetryPolicy;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument};

use crate::error::{AmosError, Result};
use crate::model::{Component, ComponentKey, InsertPolicy, LangString};
use crate::snapshot::{SnapshotOptions, from_snapshot};
use crate::storage::{
    CommitId, CommitSource, HistoryStore, NewCommit, NewRecord, StorageResult,
};
use crate::unix_now;
use crate::version::Version;

/// Language list entry admitting every language in [`Stage::prune`].
pub const ANY_LANGUAGE: &str = "*";

/// Who is committing and through which channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub author: String,
    pub email: Option<String>,
    pub source: CommitSource,
}

impl CommitMeta {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            email: None,
            source: CommitSource::default(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_source(mut self, source: CommitSource) -> Self {
        self.source = source;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RebaseOptions {
    /// Compare against the repository as of this time; `None` is now.
    pub base_timestamp: Option<i64>,
    /// Stage deletions for repository strings missing from the stage.
    pub delete_missing: bool,
    /// Timestamp of synthesized deletions; `None` is now.
    pub delete_timestamp: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CommitOptions {
    pub skip_rebase: bool,
    /// Commit envelope time; `None` is now.
    pub timestamp: Option<i64>,
    /// Empty the stage after a successful commit.
    pub clear: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            skip_rebase: false,
            timestamp: None,
            clear: true,
        }
    }
}

/// Aggregates reported by [`Stage::analyze`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageSummary {
    pub strings: usize,
    /// Comma separated, sorted.
    pub languages: String,
    /// Comma separated, sorted.
    pub components: String,
}

#[derive(Debug, Clone, Default)]
pub struct Stage {
    components: BTreeMap<String, Component>,
    // repository head seen by the last rebase
    base_head: Option<CommitId>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy every string of `component` into the matching staged component.
    pub fn add(&mut self, component: &Component, policy: InsertPolicy) -> Result<()> {
        let staged = self
            .components
            .entry(component.key().id())
            .or_insert_with(|| component.empty_like());
        for string in component.strings() {
            staged.add_string(string.clone(), policy)?;
        }
        Ok(())
    }

    pub fn get_component(&self, name: &str, language: &str, version: &Version) -> Option<&Component> {
        self.components
            .get(&ComponentKey::new(name, language, version.code()).id())
    }

    pub fn get_component_mut(
        &mut self,
        name: &str,
        language: &str,
        version: &Version,
    ) -> Option<&mut Component> {
        self.components
            .get_mut(&ComponentKey::new(name, language, version.code()).id())
    }

    pub fn has_component(&self, name: &str, language: &str, version: &Version) -> bool {
        self.get_component(name, language, version).is_some()
    }

    pub fn unlink(&mut self, name: &str, language: &str, version: &Version) -> Option<Component> {
        self.components
            .remove(&ComponentKey::new(name, language, version.code()).id())
    }

    pub fn clear(&mut self) {
        self.components.clear();
        self.base_head = None;
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of staged components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Staged components ordered by `(name, language, version)`.
    pub fn components(&self) -> Vec<&Component> {
        let mut components: Vec<&Component> = self.components.values().collect();
        components.sort_by_key(|c| c.key());
        components
    }

    /// Drop every staged string that is not a net change against the
    /// repository, then unstage components left empty.
    #[instrument(skip_all, fields(components = self.components.len()))]
    pub fn rebase(&mut self, store: &dyn HistoryStore, options: &RebaseOptions) -> Result<()> {
        self.base_head = Some(store.head()?);
        let base_timestamp = options.base_timestamp.unwrap_or_else(unix_now);
        let delete_timestamp = options.delete_timestamp.unwrap_or_else(unix_now);

        for staged in self.components.values_mut() {
            let cap = from_snapshot(
                store,
                staged.name(),
                staged.language(),
                staged.version(),
                SnapshotOptions::default().at(base_timestamp).with_deleted(),
            )?;

            if options.delete_missing {
                let missing: Vec<String> = cap
                    .strings()
                    .filter(|s| !s.deleted && !staged.has_string(&s.id))
                    .map(|s| s.id.clone())
                    .collect();
                for id in missing {
                    staged.add_string(LangString::tombstone(id, delete_timestamp), InsertPolicy::Fail)?;
                }
            }

            let key = staged.key();
            staged.retain(|string| {
                let keep = survives_rebase(string, &cap);
                debug!(component = %key, string = %string.id, keep, "rebase decision");
                keep
            });
        }

        self.components.retain(|_, c| !c.is_empty());
        Ok(())
    }

    /// Rebase (unless skipped) and append the surviving strings as one
    /// commit. `Ok(None)` means there was nothing to commit.
    ///
    /// Any storage failure rolls the transaction back, leaves the stage
    /// as it was and is reported as [`AmosError::CommitFailed`].
    #[instrument(skip_all, fields(source = %meta.source))]
    pub fn commit(
        &mut self,
        store: &dyn HistoryStore,
        message: &str,
        meta: &CommitMeta,
        options: &CommitOptions,
    ) -> Result<Option<CommitId>> {
        if !options.skip_rebase {
            self.rebase(store, &RebaseOptions::default())?;
        }
        self.components.retain(|_, c| !c.is_empty());
        if self.is_empty() {
            debug!("nothing to commit");
            return Ok(None);
        }
        let timestamp = options.timestamp.unwrap_or_else(unix_now);
        let commit_id = self
            .write_history(store, message, meta, timestamp)
            .map_err(AmosError::CommitFailed)?;

        info!(
            commit_id,
            strings = self.analyze().strings,
            components = self.len(),
            "commit recorded"
        );
        if options.clear {
            self.clear();
        }
        Ok(Some(commit_id))
    }

    fn write_history(
        &self,
        store: &dyn HistoryStore,
        message: &str,
        meta: &CommitMeta,
        timestamp: i64,
    ) -> StorageResult<CommitId> {
        let mut tx = store.begin(self.base_head)?;
        tx.insert_commit(NewCommit {
            message: message.to_string(),
            timestamp,
            source: meta.source,
            author: meta.author.clone(),
            email: meta.email.clone(),
        })?;
        for component in self.components.values() {
            for string in component.strings() {
                tx.insert_record(NewRecord {
                    component: component.name().to_string(),
                    language: component.language().to_string(),
                    string_id: string.id.clone(),
                    text: string.visible_text().map(str::to_string),
                    since: component.version().code(),
                    timestamp: string.timestamp,
                })?;
            }
        }
        tx.commit()
    }

    /// Keep only translatable components in one of `languages`;
    /// [`ANY_LANGUAGE`] admits every language.
    pub fn prune(&mut self, languages: &[String]) {
        let any = languages.iter().any(|lang| lang == ANY_LANGUAGE);
        self.components.retain(|_, component| {
            component.version().translatable()
                && (any || languages.iter().any(|lang| lang == component.language()))
        });
    }

    pub fn analyze(&self) -> StageSummary {
        let mut languages = BTreeSet::new();
        let mut names = BTreeSet::new();
        let mut strings = 0;
        for component in self.components.values() {
            strings += component.len();
            languages.insert(component.language());
            names.insert(component.name());
        }
        StageSummary {
            strings,
            languages: languages.into_iter().collect::<Vec<_>>().join(","),
            components: names.into_iter().collect::<Vec<_>>().join(","),
        }
    }

    /// Relabel every component staged under `from` as `to`, merging into
    /// components already staged under `to`.
    pub fn change_lang(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let moved: Vec<String> = self
            .components
            .iter()
            .filter(|(_, c)| c.language() == from)
            .map(|(id, _)| id.clone())
            .collect();
        for id in moved {
            let Some(mut component) = self.components.remove(&id) else {
                continue;
            };
            component.set_language(to);
            self.add(&component, InsertPolicy::Overwrite)?;
        }
        Ok(())
    }
}

fn survives_rebase(staged: &LangString, cap: &Component) -> bool {
    let Some(current) = cap.get_string(&staged.id) else {
        return true;
    };
    match (staged.deleted, current.deleted) {
        // removal or resurrection
        (true, false) | (false, true) => true,
        _ if !staged.differ(current) => false,
        // stale: something newer is committed already
        _ => staged.timestamp >= current.timestamp,
    }
}
