//! Frozen, shareable copies of a stage.
//!
//! Metadata rows live as JSON documents under `stash/meta/`, the encoded
//! stage under `stash/blob/<hash>`. Several rows may share one blob; the blob
//! goes away with the last row referencing it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AmosError, Result};
use crate::model::InsertPolicy;
use crate::stage::Stage;
use crate::stage::codec::{decode_stage, encode_stage};
use crate::storage::{BlobStore, StorageError};
use crate::unix_now;

const META_PREFIX: &str = "stash/meta/";
const BLOB_PREFIX: &str = "stash/blob/";
const AUTOSAVE_NAME: &str = "Autosave";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stash {
    pub id: Option<u64>,
    /// `0` for stashes not owned by a user.
    pub owner_id: u64,
    pub hash: Option<String>,
    pub name: String,
    pub message: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub strings: usize,
    pub languages: String,
    pub components: String,
    #[serde(skip)]
    serialized: Vec<u8>,
}

impl Stash {
    /// Freeze `stage` as it is now; later edits to it do not leak in.
    pub fn instance_from_stage(stage: &Stage, owner_id: u64, name: impl Into<String>) -> Result<Self> {
        let summary = stage.analyze();
        let now = unix_now();
        Ok(Self {
            id: None,
            owner_id,
            hash: None,
            name: name.into(),
            message: String::new(),
            created_at: now,
            modified_at: now,
            strings: summary.strings,
            languages: summary.languages,
            components: summary.components,
            serialized: encode_stage(stage)?,
        })
    }

    /// The single autosave slot of `owner_id`.
    pub fn autosave(stage: &Stage, owner_id: u64) -> Result<Self> {
        let mut stash = Self::instance_from_stage(stage, owner_id, AUTOSAVE_NAME)?;
        stash.hash = Some(autosave_hash(owner_id));
        Ok(stash)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_autosave(&self) -> bool {
        self.hash.as_deref() == Some(autosave_hash(self.owner_id).as_str())
    }

    pub fn restore_stage(&self) -> Result<Stage> {
        decode_stage(&self.serialized)
    }

    /// Merge the stashed components into `target`; stashed strings win.
    pub fn apply(&self, target: &mut Stage) -> Result<()> {
        let stashed = self.restore_stage()?;
        for component in stashed.components() {
            target.add(component, InsertPolicy::Overwrite)?;
        }
        Ok(())
    }

    fn fresh_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.owner_id.to_le_bytes());
        hasher.update(&self.created_at.to_le_bytes());
        hasher.update(&self.serialized);
        hasher.update(&rand::random::<u64>().to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

pub fn autosave_hash(owner_id: u64) -> String {
    format!("xxxxautosaveuser{owner_id}")
}

/// Stash records over a [`BlobStore`].
#[derive(Clone)]
pub struct StashPool {
    blobs: Arc<dyn BlobStore>,
}

impl StashPool {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    fn meta_key(id: u64) -> String {
        format!("{META_PREFIX}{id:010}")
    }

    fn blob_key(hash: &str) -> String {
        format!("{BLOB_PREFIX}{hash}")
    }

    /// Every metadata row, payloads not loaded.
    fn rows(&self) -> Result<Vec<Stash>> {
        let mut rows = Vec::new();
        for key in self.blobs.list(META_PREFIX)? {
            let Some(bytes) = self.blobs.get(&key)? else {
                continue;
            };
            let row: Stash = serde_json::from_slice(&bytes).map_err(StorageError::from)?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn next_id(&self) -> Result<u64> {
        let last = self
            .blobs
            .list(META_PREFIX)?
            .iter()
            .filter_map(|key| key.strip_prefix(META_PREFIX)?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(last + 1)
    }

    fn load_payload(&self, mut stash: Stash) -> Result<Stash> {
        let hash = stash
            .hash
            .clone()
            .ok_or_else(|| StorageError::Corrupted(format!("stash {:?} has no hash", stash.id)))?;
        stash.serialized = self
            .blobs
            .get(&Self::blob_key(&hash))?
            .ok_or_else(|| StorageError::Corrupted(format!("stash blob {hash} is missing")))?;
        Ok(stash)
    }

    /// Save `stash`, assigning its id and hash on first push. A stash with
    /// a preset hash already stored for the same owner is updated in place.
    pub fn push(&self, stash: &mut Stash) -> Result<u64> {
        stash.modified_at = unix_now();
        if stash.id.is_none() {
            if let Some(hash) = stash.hash.clone() {
                let owner_id = stash.owner_id;
                let existing = self.rows()?.into_iter().find(|row| {
                    row.owner_id == owner_id && row.hash.as_deref() == Some(hash.as_str())
                });
                if let Some(row) = existing {
                    stash.id = row.id;
                    stash.created_at = row.created_at;
                }
            }
        }
        let hash = match &stash.hash {
            Some(hash) => hash.clone(),
            None => {
                let hash = stash.fresh_hash();
                stash.hash = Some(hash.clone());
                hash
            }
        };
        let id = match stash.id {
            Some(id) => id,
            None => {
                let id = self.next_id()?;
                stash.id = Some(id);
                id
            }
        };

        self.blobs.put(&Self::blob_key(&hash), &stash.serialized)?;
        let meta = serde_json::to_vec(stash).map_err(StorageError::from)?;
        self.blobs.put(&Self::meta_key(id), &meta)?;
        info!(id, owner = stash.owner_id, strings = stash.strings, "stash pushed");
        Ok(id)
    }

    pub fn get(&self, id: u64) -> Result<Option<Stash>> {
        let Some(bytes) = self.blobs.get(&Self::meta_key(id))? else {
            return Ok(None);
        };
        let row: Stash = serde_json::from_slice(&bytes).map_err(StorageError::from)?;
        self.load_payload(row).map(Some)
    }

    /// Stashes of `owner` (all owners when `None`), newest first.
    pub fn list(&self, owner: Option<u64>) -> Result<Vec<Stash>> {
        let mut rows: Vec<Stash> = self
            .rows()?
            .into_iter()
            .filter(|row| owner.is_none_or(|owner| row.owner_id == owner))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.into_iter().map(|row| self.load_payload(row)).collect()
    }

    pub fn by_hash(&self, hash: &str) -> Result<Vec<Stash>> {
        self.rows()?
            .into_iter()
            .filter(|row| row.hash.as_deref() == Some(hash))
            .map(|row| self.load_payload(row))
            .collect()
    }

    /// Store `stage` in the autosave slot of `owner_id`.
    pub fn autosave(&self, owner_id: u64, stage: &Stage) -> Result<Stash> {
        let mut stash = Stash::autosave(stage, owner_id)?;
        self.push(&mut stash)?;
        Ok(stash)
    }

    /// Delete the record, and its blob unless another record shares it.
    pub fn drop_stash(&self, stash: &Stash) -> Result<()> {
        let id = stash
            .id
            .ok_or_else(|| AmosError::NotFound("stash was never pushed".to_string()))?;
        self.blobs.delete(&Self::meta_key(id))?;
        if let Some(hash) = stash.hash.as_deref() {
            let shared = self
                .rows()?
                .iter()
                .any(|row| row.hash.as_deref() == Some(hash));
            if !shared {
                self.blobs.delete(&Self::blob_key(hash))?;
            }
            debug!(id, shared, "stash dropped");
        }
        Ok(())
    }
}
