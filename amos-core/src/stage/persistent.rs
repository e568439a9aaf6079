use std::ops::{Deref, DerefMut};

use tracing::{debug, warn};

use super::Stage;
use super::codec::{decode_stage, encode_stage};
use crate::error::Result;
use crate::storage::BlobStore;

/// A [`Stage`] with a durable identity `(owner_id, stage_id)`.
///
/// `store` replaces the saved document wholesale; two sessions sharing an
/// identity overwrite each other.
#[derive(Debug, Clone)]
pub struct PersistentStage {
    owner_id: u64,
    stage_id: String,
    stage: Stage,
}

impl PersistentStage {
    pub fn new(owner_id: u64, stage_id: impl Into<String>) -> Self {
        Self {
            owner_id,
            stage_id: stage_id.into(),
            stage: Stage::new(),
        }
    }

    pub fn owner_id(&self) -> u64 {
        self.owner_id
    }

    pub fn stage_id(&self) -> &str {
        &self.stage_id
    }

    fn blob_key(&self) -> String {
        format!("stage/{}/{}", self.owner_id, self.stage_id)
    }

    pub fn store(&self, blobs: &dyn BlobStore) -> Result<()> {
        let bytes = encode_stage(&self.stage)?;
        blobs.put(&self.blob_key(), &bytes)?;
        debug!(owner = self.owner_id, stage = %self.stage_id, bytes = bytes.len(), "stage stored");
        Ok(())
    }

    /// Load the saved stage. Nothing saved, or a blob that no longer
    /// decodes, yields an empty stage.
    pub fn restore(owner_id: u64, stage_id: impl Into<String>, blobs: &dyn BlobStore) -> Result<Self> {
        let mut persistent = Self::new(owner_id, stage_id);
        let Some(bytes) = blobs.get(&persistent.blob_key())? else {
            return Ok(persistent);
        };
        match decode_stage(&bytes) {
            Ok(stage) => persistent.stage = stage,
            Err(err) => {
                warn!(
                    owner = owner_id,
                    stage = %persistent.stage_id,
                    error = %err,
                    "discarding unreadable stage"
                );
            }
        }
        Ok(persistent)
    }

    /// Remove the saved document and empty the in-memory stage.
    pub fn discard(&mut self, blobs: &dyn BlobStore) -> Result<()> {
        blobs.delete(&self.blob_key())?;
        self.stage.clear();
        Ok(())
    }

    pub fn into_stage(self) -> Stage {
        self.stage
    }
}

impl Deref for PersistentStage {
    type Target = Stage;

    fn deref(&self) -> &Stage {
        &self.stage
    }
}

impl DerefMut for PersistentStage {
    fn deref_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Component, InsertPolicy, LangString};
    use crate::storage::{FsBlobStore, MemoryBlobStore};
    use crate::test_support::version;

    fn edit() -> Component {
        let mut c = Component::new("core", "fr", version(400));
        c.add_string(LangString::new("a", "A", 1), InsertPolicy::Fail)
            .unwrap();
        c
    }

    #[test]
    fn restore_missing_is_empty() -> Result<()> {
        let blobs = MemoryBlobStore::new();
        let stage = PersistentStage::restore(7, "default", &blobs)?;
        assert!(stage.is_empty());
        Ok(())
    }

    #[test]
    fn store_then_restore_across_backends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let fs_blobs = FsBlobStore::new(dir.path())?;
        let mem_blobs = MemoryBlobStore::new();
        for blobs in [&fs_blobs as &dyn BlobStore, &mem_blobs] {
            let mut stage = PersistentStage::new(7, "default");
            stage.add(&edit(), InsertPolicy::Fail)?;
            stage.store(blobs)?;

            let restored = PersistentStage::restore(7, "default", blobs)?;
            assert_eq!(restored.len(), 1);
            assert!(restored.has_component("core", "fr", &version(400)));

            let other = PersistentStage::restore(8, "default", blobs)?;
            assert!(other.is_empty());
        }
        Ok(())
    }

    #[test]
    fn last_store_wins() -> Result<()> {
        let blobs = MemoryBlobStore::new();
        let mut first = PersistentStage::new(1, "s");
        first.add(&edit(), InsertPolicy::Fail)?;
        first.store(&blobs)?;
        let second = PersistentStage::new(1, "s");
        second.store(&blobs)?;
        assert!(PersistentStage::restore(1, "s", &blobs)?.is_empty());
        Ok(())
    }

    #[test]
    fn corrupt_blob_restores_empty_and_discard_removes() -> Result<()> {
        let blobs = MemoryBlobStore::new();
        blobs.put("stage/3/default", b"\x02\x00\x00\x00zz")?;
        let mut stage = PersistentStage::restore(3, "default", &blobs)?;
        assert!(stage.is_empty());

        stage.add(&edit(), InsertPolicy::Fail)?;
        stage.store(&blobs)?;
        stage.discard(&blobs)?;
        assert!(stage.is_empty());
        assert_eq!(blobs.get("stage/3/default")?, None);
        Ok(())
    }
}
