//! Fixtures shared by unit tests.

use std::collections::BTreeSet;

use crate::storage::{
    CommitId, CommitRecord, CommitSource, HistoryQuery, HistoryRecord, HistoryStore,
    HistoryTransaction, MemoryHistory, NewCommit, NewRecord, StorageError, StorageResult,
};
use crate::version::{Version, VersionRegistry};

pub(crate) const SUPPORTED_SINCE: i32 = 20;

pub(crate) fn registry() -> VersionRegistry {
    VersionRegistry::new([19, 20, 39, 400, 401, 402, 403], SUPPORTED_SINCE).unwrap()
}

pub(crate) fn version(code: i32) -> Version {
    Version::parse(code, SUPPORTED_SINCE).unwrap()
}

/// Commit one batch of strings straight into history.
pub(crate) fn seed(
    store: &dyn HistoryStore,
    component: &str,
    language: &str,
    since: i32,
    timestamp: i64,
    strings: &[(&str, Option<&str>)],
) -> CommitId {
    let mut tx = store.begin(None).unwrap();
    tx.insert_commit(NewCommit {
        message: format!("seed {component}/{language}"),
        timestamp,
        source: CommitSource::Import,
        author: "fixture".to_string(),
        email: None,
    })
    .unwrap();
    for (id, text) in strings {
        tx.insert_record(NewRecord {
            component: component.to_string(),
            language: language.to_string(),
            string_id: id.to_string(),
            text: text.map(str::to_string),
            since,
            timestamp,
        })
        .unwrap();
    }
    tx.commit().unwrap()
}

/// History store whose transactions fail after `fail_after` record inserts.
pub(crate) struct FailingHistory {
    pub(crate) inner: MemoryHistory,
    fail_after: usize,
}

impl FailingHistory {
    pub(crate) fn new(fail_after: usize) -> Self {
        Self {
            inner: MemoryHistory::new(),
            fail_after,
        }
    }
}

impl HistoryStore for FailingHistory {
    fn scan(&self, query: &HistoryQuery<'_>) -> StorageResult<Vec<HistoryRecord>> {
        self.inner.scan(query)
    }

    fn head(&self) -> StorageResult<CommitId> {
        self.inner.head()
    }

    fn commit_info(&self, id: CommitId) -> StorageResult<Option<CommitRecord>> {
        self.inner.commit_info(id)
    }

    fn languages(&self) -> StorageResult<BTreeSet<String>> {
        self.inner.languages()
    }

    fn components(&self) -> StorageResult<BTreeSet<String>> {
        self.inner.components()
    }

    fn begin(&self, base: Option<CommitId>) -> StorageResult<Box<dyn HistoryTransaction + '_>> {
        Ok(Box::new(FailingTransaction {
            inner: self.inner.begin(base)?,
            remaining: self.fail_after,
        }))
    }
}

struct FailingTransaction<'a> {
    inner: Box<dyn HistoryTransaction + 'a>,
    remaining: usize,
}

impl HistoryTransaction for FailingTransaction<'_> {
    fn insert_commit(&mut self, commit: NewCommit) -> StorageResult<()> {
        self.inner.insert_commit(commit)
    }

    fn insert_record(&mut self, record: NewRecord) -> StorageResult<()> {
        if self.remaining == 0 {
            return Err(StorageError::Injected(format!(
                "write of {}/{} refused",
                record.component, record.string_id
            )));
        }
        self.remaining -= 1;
        self.inner.insert_record(record)
    }

    fn commit(self: Box<Self>) -> StorageResult<CommitId> {
        self.inner.commit()
    }
}
