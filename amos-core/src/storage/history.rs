use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::StorageResult;

pub type CommitId = u64;
pub type RecordId = u64;

/// Where a commit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitSource {
    /// English strings imported from the source code repository.
    Git,
    /// Translations committed through the translator.
    #[default]
    Amos,
    /// Result of an AMOScript found in a commit message.
    CommitScript,
    /// Propagation of translations to older branches.
    Backport,
    Bot,
    Import,
}

impl fmt::Display for CommitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommitSource::Git => "git",
            CommitSource::Amos => "amos",
            CommitSource::CommitScript => "commitscript",
            CommitSource::Backport => "backport",
            CommitSource::Bot => "bot",
            CommitSource::Import => "import",
        };
        f.write_str(name)
    }
}

/// One row of the append-only string history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: RecordId,
    pub component: String,
    pub language: String,
    pub string_id: String,
    /// `None` marks a deletion.
    pub text: Option<String>,
    pub since: i32,
    pub timestamp: i64,
    pub commit_id: CommitId,
}

impl HistoryRecord {
    /// Total order used to pick the current value: highest wins.
    pub fn precedence(&self) -> (i32, i64, RecordId) {
        (self.since, self.timestamp, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub component: String,
    pub language: String,
    pub string_id: String,
    pub text: Option<String>,
    pub since: i32,
    pub timestamp: i64,
}

/// Transaction envelope of a set of history records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: CommitId,
    pub message: String,
    pub timestamp: i64,
    pub source: CommitSource,
    pub author: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    pub message: String,
    pub timestamp: i64,
    pub source: CommitSource,
    pub author: String,
    pub email: Option<String>,
}

/// Filter over history records of one component.
#[derive(Debug, Clone, Copy)]
pub struct HistoryQuery<'a> {
    pub component: &'a str,
    pub language: Option<&'a str>,
    /// Only records with `since <= max_since`.
    pub max_since: Option<i32>,
    /// Only records with `timestamp <= cutoff`.
    pub cutoff: Option<i64>,
    pub string_ids: Option<&'a [String]>,
}

impl<'a> HistoryQuery<'a> {
    pub fn component(component: &'a str) -> Self {
        Self {
            component,
            language: None,
            max_since: None,
            cutoff: None,
            string_ids: None,
        }
    }

    pub fn language(mut self, language: &'a str) -> Self {
        self.language = Some(language);
        self
    }

    pub fn max_since(mut self, since: i32) -> Self {
        self.max_since = Some(since);
        self
    }

    pub fn cutoff(mut self, cutoff: Option<i64>) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn string_ids(mut self, ids: Option<&'a [String]>) -> Self {
        self.string_ids = ids;
        self
    }

    pub fn matches(&self, record: &HistoryRecord) -> bool {
        record.component == self.component
            && self.language.is_none_or(|lang| record.language == lang)
            && self.max_since.is_none_or(|since| record.since <= since)
            && self.cutoff.is_none_or(|cutoff| record.timestamp <= cutoff)
            && self
                .string_ids
                .is_none_or(|ids| ids.iter().any(|id| *id == record.string_id))
    }
}

/// Durable append-only store of string history and commits.
pub trait HistoryStore: Send + Sync {
    /// Records matching `query`, in insertion order.
    fn scan(&self, query: &HistoryQuery<'_>) -> StorageResult<Vec<HistoryRecord>>;

    /// Id of the newest commit, `0` for an empty repository.
    fn head(&self) -> StorageResult<CommitId>;

    fn commit_info(&self, id: CommitId) -> StorageResult<Option<CommitRecord>>;

    /// Every language that has at least one record.
    fn languages(&self) -> StorageResult<BTreeSet<String>>;

    /// Every component that has at least one record.
    fn components(&self) -> StorageResult<BTreeSet<String>>;

    /// Open a transaction. With `base = Some(head)` the commit fails with
    /// [`StorageError::Conflict`](super::StorageError::Conflict) when a newer
    /// commit touched one of the `(component, language)` pairs written here.
    fn begin(&self, base: Option<CommitId>) -> StorageResult<Box<dyn HistoryTransaction + '_>>;
}

/// Pending commit. Dropping it without calling `commit` discards every write.
pub trait HistoryTransaction {
    fn insert_commit(&mut self, commit: NewCommit) -> StorageResult<()>;

    fn insert_record(&mut self, record: NewRecord) -> StorageResult<()>;

    /// Publish the envelope and all records atomically.
    fn commit(self: Box<Self>) -> StorageResult<CommitId>;
}
