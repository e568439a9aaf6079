use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::string::LangString;
use super::text::TextFormat;
use crate::error::{AmosError, Result};
use crate::version::Version;

/// What to do when a string id is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertPolicy {
    #[default]
    Fail,
    Overwrite,
}

/// Identity of a component: `(name, language, version code)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub name: String,
    pub language: String,
    pub version: i32,
}

impl ComponentKey {
    pub fn new(name: impl Into<String>, language: impl Into<String>, version: i32) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            version,
        }
    }

    /// Stable hashed identifier, used as map key inside a stage.
    pub fn id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b"#");
        hasher.update(self.language.as_bytes());
        hasher.update(b"#");
        hasher.update(&self.version.to_le_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.name, self.language, self.version)
    }
}

/// Named collection of strings scoped to a language and a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    name: String,
    language: String,
    version: Version,
    strings: BTreeMap<String, LangString>,
}

impl Component {
    pub fn new(name: impl Into<String>, language: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            version,
            strings: BTreeMap::new(),
        }
    }

    /// Empty component sharing this one's identity.
    pub fn empty_like(&self) -> Self {
        Self::new(self.name.clone(), self.language.clone(), self.version.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(self.name.clone(), self.language.clone(), self.version.code())
    }

    pub(crate) fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn add_string(&mut self, string: LangString, policy: InsertPolicy) -> Result<()> {
        if policy == InsertPolicy::Fail && self.strings.contains_key(&string.id) {
            return Err(AmosError::DuplicateStringId {
                component: self.key().to_string(),
                id: string.id,
            });
        }
        self.strings.insert(string.id.clone(), string);
        Ok(())
    }

    pub fn get_string(&self, id: &str) -> Option<&LangString> {
        self.strings.get(id)
    }

    pub fn get_string_mut(&mut self, id: &str) -> Option<&mut LangString> {
        self.strings.get_mut(id)
    }

    /// Whether `id` is present, tombstones included.
    pub fn has_string(&self, id: &str) -> bool {
        self.strings.contains_key(id)
    }

    /// Whether `id` is present and not deleted.
    pub fn has_live_string(&self, id: &str) -> bool {
        self.strings.get(id).is_some_and(|s| !s.deleted)
    }

    pub fn unlink_string(&mut self, id: &str) -> Option<LangString> {
        self.strings.remove(id)
    }

    /// Strings sorted by id.
    pub fn strings(&self) -> impl Iterator<Item = &LangString> {
        self.strings.values()
    }

    pub fn string_ids(&self) -> impl Iterator<Item = &str> {
        self.strings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn clear(&mut self) {
        self.strings.clear();
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&LangString) -> bool) {
        self.strings.retain(|_, s| keep(s));
    }

    /// Remove every string whose id does not exist in `mask`.
    /// Returns the number of removed strings.
    pub fn intersect(&mut self, mask: &Component) -> usize {
        let before = self.strings.len();
        self.strings.retain(|id, _| mask.has_string(id));
        before - self.strings.len()
    }

    /// Remove live strings carrying the same text as `reference`; strings
    /// deleted in `reference` are left alone. Returns the removed ids.
    pub fn complement(&mut self, reference: &Component) -> Vec<String> {
        let redundant: Vec<String> = self
            .strings
            .values()
            .filter(|s| !s.deleted)
            .filter(|s| {
                reference
                    .get_string(&s.id)
                    .is_some_and(|r| !r.deleted && !s.differ(r))
            })
            .map(|s| s.id.clone())
            .collect();
        for id in &redundant {
            self.strings.remove(id);
        }
        redundant
    }

    /// Normalise every text according to the component version's format.
    pub fn clean_texts(&mut self) {
        let format = TextFormat::for_version(&self.version);
        for string in self.strings.values_mut() {
            string.clean_text(format);
        }
    }
}
