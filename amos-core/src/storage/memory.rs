use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use super::history::{
    CommitId, CommitRecord, HistoryQuery, HistoryRecord, HistoryStore, HistoryTransaction,
    NewCommit, NewRecord, RecordId,
};
use super::{StorageError, StorageResult};

/// In-memory index shared by every history backend.
#[derive(Debug, Default)]
pub(crate) struct HistoryIndex {
    records: Vec<HistoryRecord>,
    by_component: HashMap<String, Vec<usize>>,
    commits: BTreeMap<CommitId, CommitRecord>,
    // (component, language) pairs written by each commit
    touched: BTreeMap<CommitId, BTreeSet<(String, String)>>,
    last_record: RecordId,
}

impl HistoryIndex {
    pub(crate) fn scan(&self, query: &HistoryQuery<'_>) -> Vec<HistoryRecord> {
        let Some(positions) = self.by_component.get(query.component) else {
            return Vec::new();
        };
        positions
            .iter()
            .map(|pos| &self.records[*pos])
            .filter(|record| query.matches(record))
            .cloned()
            .collect()
    }

    pub(crate) fn head(&self) -> CommitId {
        self.commits.keys().next_back().copied().unwrap_or(0)
    }

    pub(crate) fn commit_info(&self, id: CommitId) -> Option<CommitRecord> {
        self.commits.get(&id).cloned()
    }

    pub(crate) fn languages(&self) -> BTreeSet<String> {
        self.records.iter().map(|r| r.language.clone()).collect()
    }

    pub(crate) fn components(&self) -> BTreeSet<String> {
        self.by_component.keys().cloned().collect()
    }

    /// Fail when a commit newer than `base` wrote any of `pairs`.
    pub(crate) fn check_conflict(
        &self,
        base: CommitId,
        pairs: &BTreeSet<(String, String)>,
    ) -> StorageResult<()> {
        let clash = self
            .touched
            .range(base + 1..)
            .any(|(_, written)| !written.is_disjoint(pairs));
        if clash {
            return Err(StorageError::Conflict {
                base,
                head: self.head(),
            });
        }
        Ok(())
    }

    /// Assign ids to a pending commit without applying it.
    pub(crate) fn prepare(
        &self,
        envelope: NewCommit,
        records: Vec<NewRecord>,
    ) -> (CommitRecord, Vec<HistoryRecord>) {
        let commit_id = self.head() + 1;
        let commit = CommitRecord {
            id: commit_id,
            message: envelope.message,
            timestamp: envelope.timestamp,
            source: envelope.source,
            author: envelope.author,
            email: envelope.email,
        };
        let records = records
            .into_iter()
            .enumerate()
            .map(|(offset, record)| HistoryRecord {
                id: self.last_record + 1 + offset as RecordId,
                component: record.component,
                language: record.language,
                string_id: record.string_id,
                text: record.text,
                since: record.since,
                timestamp: record.timestamp,
                commit_id,
            })
            .collect();
        (commit, records)
    }

    pub(crate) fn apply(&mut self, commit: CommitRecord, records: Vec<HistoryRecord>) {
        let mut pairs = BTreeSet::new();
        for record in records {
            pairs.insert((record.component.clone(), record.language.clone()));
            self.last_record = self.last_record.max(record.id);
            self.by_component
                .entry(record.component.clone())
                .or_default()
                .push(self.records.len());
            self.records.push(record);
        }
        self.touched.insert(commit.id, pairs);
        self.commits.insert(commit.id, commit);
    }
}

/// Writes buffered by an open transaction.
#[derive(Debug, Default)]
pub(crate) struct PendingCommit {
    pub(crate) base: Option<CommitId>,
    pub(crate) envelope: Option<NewCommit>,
    pub(crate) records: Vec<NewRecord>,
}

impl PendingCommit {
    pub(crate) fn new(base: Option<CommitId>) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    pub(crate) fn pairs(&self) -> BTreeSet<(String, String)> {
        self.records
            .iter()
            .map(|r| (r.component.clone(), r.language.clone()))
            .collect()
    }

    /// Validate against `index` and assign ids.
    pub(crate) fn seal(self, index: &HistoryIndex) -> StorageResult<(CommitRecord, Vec<HistoryRecord>)> {
        if let Some(base) = self.base {
            index.check_conflict(base, &self.pairs())?;
        }
        let envelope = self.envelope.ok_or(StorageError::MissingEnvelope)?;
        Ok(index.prepare(envelope, self.records))
    }
}

/// Non-durable history store.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    index: RwLock<HistoryIndex>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, HistoryIndex>> {
        self.index
            .read()
            .map_err(|_| StorageError::Poisoned("history index"))
    }
}

impl HistoryStore for MemoryHistory {
    fn scan(&self, query: &HistoryQuery<'_>) -> StorageResult<Vec<HistoryRecord>> {
        Ok(self.read()?.scan(query))
    }

    fn head(&self) -> StorageResult<CommitId> {
        Ok(self.read()?.head())
    }

    fn commit_info(&self, id: CommitId) -> StorageResult<Option<CommitRecord>> {
        Ok(self.read()?.commit_info(id))
    }

    fn languages(&self) -> StorageResult<BTreeSet<String>> {
        Ok(self.read()?.languages())
    }

    fn components(&self) -> StorageResult<BTreeSet<String>> {
        Ok(self.read()?.components())
    }

    fn begin(&self, base: Option<CommitId>) -> StorageResult<Box<dyn HistoryTransaction + '_>> {
        Ok(Box::new(MemoryTransaction {
            store: self,
            pending: PendingCommit::new(base),
        }))
    }
}

struct MemoryTransaction<'a> {
    store: &'a MemoryHistory,
    pending: PendingCommit,
}

impl HistoryTransaction for MemoryTransaction<'_> {
    fn insert_commit(&mut self, commit: NewCommit) -> StorageResult<()> {
        self.pending.envelope = Some(commit);
        Ok(())
    }

    fn insert_record(&mut self, record: NewRecord) -> StorageResult<()> {
        self.pending.records.push(record);
        Ok(())
    }

    fn commit(self: Box<Self>) -> StorageResult<CommitId> {
        let mut index = self
            .store
            .index
            .write()
            .map_err(|_| StorageError::Poisoned("history index"))?;
        let (commit, records) = self.pending.seal(&index)?;
        let id = commit.id;
        index.apply(commit, records);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CommitSource;

    fn envelope(message: &str) -> NewCommit {
        NewCommit {
            message: message.to_string(),
            timestamp: 10,
            source: CommitSource::Amos,
            author: "tester".to_string(),
            email: None,
        }
    }

    fn record(component: &str, lang: &str, id: &str, text: &str) -> NewRecord {
        NewRecord {
            component: component.to_string(),
            language: lang.to_string(),
            string_id: id.to_string(),
            text: Some(text.to_string()),
            since: 400,
            timestamp: 10,
        }
    }

    #[test]
    fn commit_assigns_monotonic_ids() -> StorageResult<()> {
        let store = MemoryHistory::new();
        let mut tx = store.begin(None)?;
        tx.insert_commit(envelope("first"))?;
        tx.insert_record(record("core", "fr", "a", "A"))?;
        tx.insert_record(record("core", "fr", "b", "B"))?;
        assert_eq!(tx.commit()?, 1);

        let mut tx = store.begin(None)?;
        tx.insert_commit(envelope("second"))?;
        tx.insert_record(record("core", "de", "a", "A"))?;
        assert_eq!(tx.commit()?, 2);

        let rows = store.scan(&HistoryQuery::component("core"))?;
        let ids: Vec<RecordId> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(rows[2].commit_id, 2);
        assert_eq!(store.head()?, 2);
        assert_eq!(store.commit_info(1)?.unwrap().message, "first");
        Ok(())
    }

    #[test]
    fn dropped_transaction_leaves_no_trace() -> StorageResult<()> {
        let store = MemoryHistory::new();
        {
            let mut tx = store.begin(None)?;
            tx.insert_commit(envelope("never"))?;
            tx.insert_record(record("core", "fr", "a", "A"))?;
        }
        assert_eq!(store.head()?, 0);
        assert!(store.scan(&HistoryQuery::component("core"))?.is_empty());
        Ok(())
    }

    #[test]
    fn commit_without_envelope_is_rejected() -> StorageResult<()> {
        let store = MemoryHistory::new();
        let mut tx = store.begin(None)?;
        tx.insert_record(record("core", "fr", "a", "A"))?;
        assert!(matches!(tx.commit(), Err(StorageError::MissingEnvelope)));
        Ok(())
    }

    #[test]
    fn stale_base_conflicts_only_on_overlap() -> StorageResult<()> {
        let store = MemoryHistory::new();
        let base = store.head()?;

        let mut tx = store.begin(None)?;
        tx.insert_commit(envelope("concurrent"))?;
        tx.insert_record(record("core", "fr", "a", "A"))?;
        tx.commit()?;

        let mut other = store.begin(Some(base))?;
        other.insert_commit(envelope("other language"))?;
        other.insert_record(record("core", "de", "a", "A"))?;
        other.commit()?;

        let mut clash = store.begin(Some(base))?;
        clash.insert_commit(envelope("same language"))?;
        clash.insert_record(record("core", "fr", "a", "B"))?;
        assert!(matches!(
            clash.commit(),
            Err(StorageError::Conflict { base: 0, head: 2 })
        ));
        Ok(())
    }

    #[test]
    fn query_filters_compose() -> StorageResult<()> {
        let store = MemoryHistory::new();
        let mut tx = store.begin(None)?;
        tx.insert_commit(envelope("seed"))?;
        tx.insert_record(record("core", "fr", "a", "A"))?;
        let mut late = record("core", "fr", "b", "B");
        late.since = 401;
        late.timestamp = 99;
        tx.insert_record(late)?;
        tx.insert_record(record("mod_forum", "fr", "a", "A"))?;
        tx.commit()?;

        let ids = vec!["b".to_string()];
        assert_eq!(
            store
                .scan(&HistoryQuery::component("core").language("fr").max_since(400))?
                .len(),
            1
        );
        assert_eq!(
            store
                .scan(&HistoryQuery::component("core").cutoff(Some(50)))?
                .len(),
            1
        );
        assert_eq!(
            store
                .scan(&HistoryQuery::component("core").string_ids(Some(&ids)))?
                .len(),
            1
        );
        assert_eq!(store.components()?.len(), 2);
        assert_eq!(store.languages()?, BTreeSet::from(["fr".to_string()]));
        Ok(())
    }
}
