use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;

use super::{StorageError, StorageResult};

const TEMP_PREFIX: &str = ".amos-tmp";

/// Key/value store for opaque blobs (serialized stages, stash payloads).
///
/// `put` replaces whatever is stored under the key. There is no
/// compare-and-swap: the last writer wins.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Returns whether something was deleted.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Keys are `/`-separated segments of `[A-Za-z0-9_.-]`.
fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.split('/').all(|segment| {
            !segment.is_empty()
                && segment != "."
                && segment != ".."
                && !segment.starts_with(TEMP_PREFIX)
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        });
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StorageError::Poisoned("blob store"))?;
        Ok(blobs.get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StorageError::Poisoned("blob store"))?;
        blobs.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| StorageError::Poisoned("blob store"))?;
        Ok(blobs.remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| StorageError::Poisoned("blob store"))?;
        Ok(blobs
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Blob store mapping each key onto a file below `root`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn collect_keys(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> StorageResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let key = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };
            if entry.file_type()?.is_dir() {
                self.collect_keys(&entry.path(), &key, out)?;
            } else {
                out.push(key);
            }
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_of(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path_of(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent)?;

        // 先写临时文件再原子替换，读者不会看到写了一半的数据
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(parent)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        persist(tmp, &path)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, "", &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

fn persist(tmp: NamedTempFile, path: &Path) -> StorageResult<()> {
    tmp.persist(path).map_err(|err| StorageError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn BlobStore) -> StorageResult<()> {
        assert_eq!(store.get("stage/1/default")?, None);
        store.put("stage/1/default", b"one")?;
        store.put("stage/1/default", b"two")?;
        store.put("stage/2/default", b"other")?;
        store.put("stash/blob/abc", b"payload")?;
        assert_eq!(store.get("stage/1/default")?, Some(b"two".to_vec()));
        assert_eq!(
            store.list("stage/")?,
            vec!["stage/1/default".to_string(), "stage/2/default".to_string()]
        );
        assert!(store.delete("stage/1/default")?);
        assert!(!store.delete("stage/1/default")?);
        assert_eq!(store.list("stage/")?, vec!["stage/2/default".to_string()]);
        Ok(())
    }

    #[test]
    fn memory_store_replaces_documents() -> StorageResult<()> {
        exercise(&MemoryBlobStore::new())
    }

    #[test]
    fn fs_store_replaces_documents() -> StorageResult<()> {
        let dir = tempfile::tempdir()?;
        let store = FsBlobStore::new(dir.path().join("blobs"))?;
        exercise(&store)?;
        assert!(store.root().join("stash").join("blob").join("abc").exists());
        Ok(())
    }

    #[test]
    fn keys_cannot_escape_the_root() {
        let store = MemoryBlobStore::new();
        for key in ["", "../etc/passwd", "stage//x", "stage/a b", "/abs", ".amos-tmp1"] {
            assert!(
                matches!(store.put(key, b"x"), Err(StorageError::InvalidKey(_))),
                "{key} accepted"
            );
        }
    }
}
