use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::history::{
    CommitId, CommitRecord, HistoryQuery, HistoryRecord, HistoryStore, HistoryTransaction,
    NewCommit, NewRecord,
};
use super::memory::{HistoryIndex, PendingCommit};
use super::{StorageError, StorageResult};

/// One line of the journal. A commit is `Begin`, its `Record`s, then `Commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entry", rename_all = "snake_case")]
enum JournalEntry {
    Begin { tx: CommitId },
    Record { tx: CommitId, record: HistoryRecord },
    Commit { tx: CommitId, commit: CommitRecord },
}

/// Durable history store backed by an append-only JSON-lines journal.
///
/// Every line is prefixed with the CRC32 of its payload. On open, only
/// transactions terminated by a `Commit` line are replayed and anything
/// after the last one is cut off, so a torn write never surfaces.
pub struct JournalHistory {
    path: PathBuf,
    index: RwLock<HistoryIndex>,
    writer: Mutex<File>,
    // a failed write could not be rolled back; appends are refused until reopen
    torn: AtomicBool,
}

impl JournalHistory {
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let (index, valid_len) = if path.exists() {
            replay(&path)?
        } else {
            (HistoryIndex::default(), 0)
        };
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        let actual_len = file.metadata()?.len();
        if actual_len > valid_len {
            warn!(
                path = %path.display(),
                dropped_bytes = actual_len - valid_len,
                "discarding incomplete journal tail"
            );
            file.set_len(valid_len)?;
        }
        debug!(path = %path.display(), head = index.head(), "journal opened");
        Ok(Self {
            path,
            index: RwLock::new(index),
            writer: Mutex::new(file),
            torn: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StorageResult<std::sync::RwLockReadGuard<'_, HistoryIndex>> {
        self.index
            .read()
            .map_err(|_| StorageError::Poisoned("journal index"))
    }

    fn append(&self, commit: &CommitRecord, records: &[HistoryRecord]) -> StorageResult<()> {
        let mut buffer = encode_line(&JournalEntry::Begin { tx: commit.id })?;
        for record in records {
            buffer.push_str(&encode_line(&JournalEntry::Record {
                tx: commit.id,
                record: record.clone(),
            })?);
        }
        buffer.push_str(&encode_line(&JournalEntry::Commit {
            tx: commit.id,
            commit: commit.clone(),
        })?);

        let mut file = self
            .writer
            .lock()
            .map_err(|_| StorageError::Poisoned("journal writer"))?;
        if self.torn.load(Ordering::Acquire) {
            return Err(StorageError::Corrupted(format!(
                "{} ends with a torn write, reopen it to recover",
                self.path.display()
            )));
        }
        let start = file.seek(SeekFrom::End(0))?;
        let written = file
            .write_all(buffer.as_bytes())
            .and_then(|_| file.sync_data());
        if let Err(err) = written {
            // 回滚到写入前的长度，保证日志中不残留半个事务
            if let Err(truncate) = file.set_len(start) {
                error!(
                    path = %self.path.display(),
                    error = %truncate,
                    "cannot roll back torn journal write, refusing further appends"
                );
                self.torn.store(true, Ordering::Release);
            }
            return Err(err.into());
        }
        Ok(())
    }
}

impl HistoryStore for JournalHistory {
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
        Ok(Box::new(JournalTransaction {
            store: self,
            pending: PendingCommit::new(base),
        }))
    }
}

struct JournalTransaction<'a> {
    store: &'a JournalHistory,
    pending: PendingCommit,
}

impl HistoryTransaction for JournalTransaction<'_> {
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
            .map_err(|_| StorageError::Poisoned("journal index"))?;
        let (commit, records) = self.pending.seal(&index)?;
        self.store.append(&commit, &records)?;
        let id = commit.id;
        index.apply(commit, records);
        Ok(id)
    }
}

fn encode_line(entry: &JournalEntry) -> StorageResult<String> {
    let json = serde_json::to_string(entry)?;
    let crc = crc32fast::hash(json.as_bytes());
    Ok(format!("{crc:08x} {json}\n"))
}

fn decode_line(line: &str) -> Option<JournalEntry> {
    let (crc, json) = line.split_once(' ')?;
    let expected = u32::from_str_radix(crc, 16).ok()?;
    if crc32fast::hash(json.as_bytes()) != expected {
        return None;
    }
    serde_json::from_str(json).ok()
}

/// Rebuild the index; returns it with the byte length of the committed prefix.
fn replay(path: &Path) -> StorageResult<(HistoryIndex, u64)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut index = HistoryIndex::default();
    let mut pending: HashMap<CommitId, Vec<HistoryRecord>> = HashMap::new();
    let mut offset = 0u64;
    let mut committed_len = 0u64;
    let mut line = String::new();

    loop {
        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(offset, "journal contains invalid UTF-8, stopping replay");
                break;
            }
            Err(err) => return Err(err.into()),
        };
        if read == 0 || !line.ends_with('\n') {
            break;
        }
        offset += read as u64;
        let Some(entry) = decode_line(line.trim_end_matches('\n')) else {
            warn!(offset, "journal checksum mismatch, stopping replay");
            break;
        };
        match entry {
            JournalEntry::Begin { tx } => {
                pending.insert(tx, Vec::new());
            }
            JournalEntry::Record { tx, record } => {
                if let Some(records) = pending.get_mut(&tx) {
                    records.push(record);
                }
            }
            JournalEntry::Commit { tx, commit } => {
                let records = pending.remove(&tx).unwrap_or_default();
                index.apply(commit, records);
                committed_len = offset;
            }
        }
    }
    Ok((index, committed_len))
}
