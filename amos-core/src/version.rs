//! Registry of product release branches.
//!
//! A branch is identified by an integer code. Two-digit codes belong to the
//! 1.x/2.x/3.x lines (`39` is 3.9), codes with three or more digits to 4.0
//! onwards (`401` is 4.1). Every code maps to exactly one immutable
//! [`Version`] value.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use bincode::{Decode, Encode};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::entity::ConfigEntity;
use crate::error::{AmosError, Result};

/// Highest code written with the legacy format 1 string syntax.
pub const LAST_LEGACY_CODE: i32 = 19;

const BRANCH_PREFIX: &str = "MOODLE_";
const BRANCH_SUFFIX: &str = "_STABLE";

/// 版本描述符
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct Version {
    code: i32,
    label: String,
    directory: String,
    translatable: bool,
}

impl Version {
    /// Build a descriptor from a branch code. `supported_since` is the
    /// oldest code that still accepts translations.
    pub fn parse(code: i32, supported_since: i32) -> Result<Self> {
        let (major, minor) = split_code(code)?;
        let label = format!("{major}.{minor}");
        Ok(Self {
            code,
            directory: label.clone(),
            label,
            translatable: code >= supported_since,
        })
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn translatable(&self) -> bool {
        self.translatable
    }

    /// Git branch carrying this version, e.g. `MOODLE_401_STABLE`.
    pub fn branch_name(&self) -> String {
        format!("{BRANCH_PREFIX}{}{BRANCH_SUFFIX}", self.code)
    }

    /// Whether strings on this branch use the legacy format 1 syntax.
    pub fn is_legacy_format(&self) -> bool {
        self.code <= LAST_LEGACY_CODE
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code.cmp(&other.code)
    }
}

fn split_code(code: i32) -> Result<(i32, i32)> {
    if code < 10 {
        return Err(AmosError::InvalidVersionCode(code.to_string()));
    }
    if code < 100 {
        Ok((code / 10, code % 10))
    } else {
        Ok((code / 100, code % 100))
    }
}

/// Memoizing factory of [`Version`] values plus the ordered list of known
/// branches supplied by configuration.
#[derive(Debug)]
pub struct VersionRegistry {
    codes: Vec<i32>,
    supported_since: i32,
    cache: DashMap<i32, Version>,
}

impl VersionRegistry {
    pub fn new(codes: impl IntoIterator<Item = i32>, supported_since: i32) -> Result<Self> {
        let mut codes: Vec<i32> = codes.into_iter().collect();
        for code in &codes {
            split_code(*code)?;
        }
        codes.sort_unstable();
        codes.dedup();
        Ok(Self {
            codes,
            supported_since,
            cache: DashMap::new(),
        })
    }

    pub fn from_config(config: &ConfigEntity) -> Result<Self> {
        Self::new(config.versions.iter().copied(), config.supported_since)
    }

    pub fn by_code(&self, code: i32) -> Result<Version> {
        if let Some(version) = self.cache.get(&code) {
            return Ok(version.clone());
        }
        let version = Version::parse(code, self.supported_since)?;
        self.cache.insert(code, version.clone());
        Ok(version)
    }

    /// Resolve `MOODLE_401_STABLE` style names. `main` and `master` point at
    /// the newest registered version.
    pub fn by_branch_name(&self, name: &str) -> Result<Version> {
        let name = name.trim();
        if name == "main" || name == "master" {
            return self.latest_version();
        }
        let code = name
            .strip_prefix(BRANCH_PREFIX)
            .and_then(|rest| rest.strip_suffix(BRANCH_SUFFIX))
            .and_then(|digits| digits.parse::<i32>().ok())
            .ok_or_else(|| AmosError::InvalidBranchName(name.to_string()))?;
        self.by_code(code)
            .map_err(|_| AmosError::InvalidBranchName(name.to_string()))
    }

    /// Resolve a directory label such as `3.9` or `4.1`.
    pub fn by_directory(&self, dir: &str) -> Result<Version> {
        let invalid = || AmosError::InvalidDirectory(dir.to_string());
        let (major, minor) = dir.trim().split_once('.').ok_or_else(invalid)?;
        let major: i32 = major.parse().map_err(|_| invalid())?;
        let minor: i32 = minor.parse().map_err(|_| invalid())?;
        if major < 1 || minor < 0 {
            return Err(invalid());
        }
        let code = if major >= 4 {
            major * 100 + minor
        } else if minor < 10 {
            major * 10 + minor
        } else {
            return Err(invalid());
        };
        self.by_code(code)
    }

    /// All registered versions, ascending by code.
    pub fn list_all(&self) -> Result<Vec<Version>> {
        self.codes.iter().map(|code| self.by_code(*code)).collect()
    }

    /// Registered versions with `start <= code <= end`.
    pub fn list_range(&self, start: i32, end: Option<i32>) -> Result<Vec<Version>> {
        self.codes
            .iter()
            .filter(|code| **code >= start && end.is_none_or(|end| **code <= end))
            .map(|code| self.by_code(*code))
            .collect()
    }

    /// Registered versions that accept translations.
    pub fn list_translatable(&self) -> Result<Vec<Version>> {
        self.list_range(self.supported_since, None)
    }

    pub fn latest_version(&self) -> Result<Version> {
        let code = self
            .codes
            .last()
            .ok_or_else(|| AmosError::Config("no versions configured".to_string()))?;
        self.by_code(*code)
    }

    pub fn oldest_version(&self) -> Result<Version> {
        let code = self
            .codes
            .first()
            .ok_or_else(|| AmosError::Config("no versions configured".to_string()))?;
        self.by_code(*code)
    }

    pub fn contains(&self, code: i32) -> bool {
        self.codes.binary_search(&code).is_ok()
    }

    pub fn supported_since(&self) -> i32 {
        self.supported_since
    }
}
