use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigEntity {
    /// Known branch codes, ascending.
    pub versions: Vec<i32>,
    /// Oldest branch still accepting translations.
    pub supported_since: i32,

    /// Directory holding the history journal and the blob store.
    pub data_root: String,
    /// Languages processed by scripts; empty means every language in history.
    pub languages: Vec<String>,
    /// Root of the per-language help files read by `HLP`.
    pub help_root: Option<String>,
    /// Rebase+commit attempts before a conflicting commit is given up.
    pub commit_retries: u32,

    pub log_level: String,
    pub log_format: String,
    /// Write logs to this file as well; `None` logs to stdout only.
    pub log_file: Option<String>,
    /// `hourly`, `daily` or `never`.
    pub log_rotation: String,
    /// Keep logging to stdout when `log_file` is set.
    pub log_stdout: bool,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        Self {
            // 1.9 .. 3.9, then 4.0 .. 4.5 and 5.0
            versions: (19..=39).chain(400..=405).chain([500]).collect(),
            supported_since: 20,

            data_root: default_data_root(),
            languages: Vec::new(),
            help_root: None,
            commit_retries: 3,

            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            log_file: None,
            log_rotation: "daily".to_string(),
            log_stdout: false,
        }
    }
}

impl ConfigEntity {
    pub fn journal_path(&self) -> PathBuf {
        PathBuf::from(&self.data_root).join("history.journal")
    }

    pub fn blob_root(&self) -> PathBuf {
        PathBuf::from(&self.data_root).join("blobs")
    }
}

fn default_data_root() -> String {
    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let mut path = PathBuf::from(appdata);
            path.push("amos");
            path.to_string_lossy().into_owned()
        } else {
            "%AppData%/amos".to_string()
        }
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
        format!("{home}/.amos")
    }
}
