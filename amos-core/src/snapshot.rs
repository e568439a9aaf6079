//! Reconstruction of component state from the append-only history.
//!
//! A record set on branch `since` is visible on every later branch until a
//! record with a higher `since` overrides it. Among the candidates the one
//! with the greatest `(since, timestamp, record id)` wins, so on exact
//! `(since, timestamp)` ties the latest inserted record is authoritative.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use crate::ENGLISH;
use crate::error::Result;
use crate::model::{Component, InsertPolicy, LangString};
use crate::storage::{HistoryQuery, HistoryRecord, HistoryStore};
use crate::version::Version;

/// Knobs of [`from_snapshot`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions<'a> {
    /// Ignore records newer than this timestamp.
    pub cutoff: Option<i64>,
    /// Keep winning tombstones instead of dropping them.
    pub include_deleted: bool,
    /// Resolve only these string ids.
    pub string_ids: Option<&'a [String]>,
}

impl<'a> SnapshotOptions<'a> {
    pub fn at(mut self, cutoff: i64) -> Self {
        self.cutoff = Some(cutoff);
        self
    }

    pub fn with_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn only(mut self, ids: &'a [String]) -> Self {
        self.string_ids = Some(ids);
        self
    }
}

/// Current state of `name`/`language` on `version`.
///
/// Absence is not an error: a component with no history resolves to an
/// empty [`Component`].
#[instrument(skip_all, fields(component = name, language = language, version = version.code()))]
pub fn from_snapshot(
    store: &dyn HistoryStore,
    name: &str,
    language: &str,
    version: &Version,
    options: SnapshotOptions<'_>,
) -> Result<Component> {
    let query = HistoryQuery::component(name)
        .language(language)
        .max_since(version.code())
        .cutoff(options.cutoff)
        .string_ids(options.string_ids);
    let records = store.scan(&query)?;
    let scanned = records.len();

    let mut winners: BTreeMap<String, HistoryRecord> = BTreeMap::new();
    for record in records {
        match winners.get(&record.string_id) {
            Some(current) if current.precedence() >= record.precedence() => {}
            _ => {
                winners.insert(record.string_id.clone(), record);
            }
        }
    }

    let mut component = Component::new(name, language, version.clone());
    for record in winners.into_values() {
        let string = match record.text {
            Some(text) => LangString::new(record.string_id, text, record.timestamp),
            None if options.include_deleted => {
                LangString::tombstone(record.string_id, record.timestamp)
            }
            None => continue,
        };
        component.add_string(string, InsertPolicy::Overwrite)?;
    }
    debug!(scanned, resolved = component.len(), "snapshot resolved");
    Ok(component)
}

/// Every record ever written for one string, oldest first.
pub fn string_timeline(
    store: &dyn HistoryStore,
    component: &str,
    language: &str,
    string_id: &str,
) -> Result<Vec<HistoryRecord>> {
    let ids = [string_id.to_string()];
    let query = HistoryQuery::component(component)
        .language(language)
        .string_ids(Some(&ids));
    let mut records = store.scan(&query)?;
    records.sort_by_key(HistoryRecord::precedence);
    Ok(records)
}

/// Translation languages: `configured` when given, otherwise every language
/// present in history. English is never included.
pub fn known_languages(store: &dyn HistoryStore, configured: &[String]) -> Result<Vec<String>> {
    let languages: BTreeSet<String> = if configured.is_empty() {
        store.languages()?
    } else {
        configured.iter().cloned().collect()
    };
    Ok(languages
        .into_iter()
        .filter(|lang| lang != ENGLISH)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed, version};
    use crate::storage::MemoryHistory;

    #[test]
    fn later_branch_inherits_until_overridden() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "core", "fr", 400, 10, &[("a", Some("A400")), ("b", Some("B400"))]);
        seed(&store, "core", "fr", 402, 20, &[("a", Some("A402"))]);

        let v401 = from_snapshot(&store, "core", "fr", &version(401), SnapshotOptions::default())?;
        assert_eq!(v401.get_string("a").unwrap().text.as_deref(), Some("A400"));

        let v403 = from_snapshot(&store, "core", "fr", &version(403), SnapshotOptions::default())?;
        assert_eq!(v403.get_string("a").unwrap().text.as_deref(), Some("A402"));
        assert_eq!(v403.get_string("b").unwrap().text.as_deref(), Some("B400"));

        let v39 = from_snapshot(&store, "core", "fr", &version(39), SnapshotOptions::default())?;
        assert!(v39.is_empty());
        Ok(())
    }

    #[test]
    fn exact_tie_prefers_latest_insertion() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "core", "fr", 400, 10, &[("a", Some("first"))]);
        seed(&store, "core", "fr", 400, 10, &[("a", Some("second"))]);
        seed(&store, "core", "fr", 400, 5, &[("a", Some("older"))]);

        for _ in 0..2 {
            let c = from_snapshot(&store, "core", "fr", &version(400), SnapshotOptions::default())?;
            assert_eq!(c.get_string("a").unwrap().text.as_deref(), Some("second"));
        }
        Ok(())
    }

    #[test]
    fn tombstones_and_cutoff() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "core", "fr", 400, 10, &[("a", Some("A")), ("b", Some("B"))]);
        seed(&store, "core", "fr", 400, 20, &[("a", None)]);

        let now = from_snapshot(&store, "core", "fr", &version(400), SnapshotOptions::default())?;
        assert!(!now.has_string("a"));

        let with_deleted = from_snapshot(
            &store,
            "core",
            "fr",
            &version(400),
            SnapshotOptions::default().with_deleted(),
        )?;
        assert!(with_deleted.get_string("a").unwrap().deleted);

        let before = from_snapshot(
            &store,
            "core",
            "fr",
            &version(400),
            SnapshotOptions::default().at(15),
        )?;
        assert_eq!(before.get_string("a").unwrap().text.as_deref(), Some("A"));

        let ids = vec!["b".to_string()];
        let only_b = from_snapshot(
            &store,
            "core",
            "fr",
            &version(400),
            SnapshotOptions::default().only(&ids),
        )?;
        assert_eq!(only_b.string_ids().collect::<Vec<_>>(), vec!["b"]);
        Ok(())
    }

    #[test]
    fn timeline_and_languages() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "core", "en", 400, 1, &[("a", Some("Hello"))]);
        seed(&store, "core", "fr", 401, 5, &[("a", Some("Salut"))]);
        seed(&store, "core", "fr", 400, 9, &[("a", Some("Bonjour"))]);
        seed(&store, "core", "de", 400, 9, &[("a", Some("Hallo"))]);

        let timeline = string_timeline(&store, "core", "fr", "a")?;
        let texts: Vec<_> = timeline.iter().map(|r| r.text.as_deref()).collect();
        assert_eq!(texts, vec![Some("Bonjour"), Some("Salut")]);

        assert_eq!(known_languages(&store, &[])?, vec!["de", "fr"]);
        let configured = vec!["en".to_string(), "cs".to_string()];
        assert_eq!(known_languages(&store, &configured)?, vec!["cs"]);
        Ok(())
    }
}
