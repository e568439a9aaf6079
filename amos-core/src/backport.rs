//! Propagation of translations down to older branches.
//!
//! A translation often lands only on the newest branch although the
//! English string exists on older ones too. Wherever an older branch
//! carries the very same English text, the translation applies there as
//! well and is committed onto it.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::merge::merge_translations;
use crate::model::{Component, InsertPolicy, LangString};
use crate::snapshot::{SnapshotOptions, from_snapshot};
use crate::stage::{CommitMeta, CommitOptions, RetryPolicy, Stage};
use crate::storage::{CommitId, CommitSource, HistoryQuery, HistoryStore};
use crate::version::{Version, VersionRegistry};
use crate::{ENGLISH, FIX_LANGUAGE};

const BACKPORT_AUTHOR: &str = "AMOS-bot";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackportReport {
    pub commits: Vec<CommitId>,
    /// Strings committed onto older branches.
    pub strings: usize,
}

/// Lowest `since` of a live record per string id.
fn first_appearance(store: &dyn HistoryStore, component: &str, language: &str) -> Result<BTreeMap<String, i32>> {
    let mut first: BTreeMap<String, i32> = BTreeMap::new();
    for record in store.scan(&HistoryQuery::component(component).language(language))? {
        if record.text.is_none() {
            continue;
        }
        first
            .entry(record.string_id)
            .and_modify(|since| *since = (*since).min(record.since))
            .or_insert(record.since);
    }
    Ok(first)
}

fn resolve_one(
    store: &dyn HistoryStore,
    component: &str,
    language: &str,
    version: &Version,
    ids: &[String],
) -> Result<Option<LangString>> {
    let resolved = from_snapshot(store, component, language, version, SnapshotOptions::default().only(ids))?;
    Ok(ids.first().and_then(|id| resolved.get_string(id)).cloned())
}

/// Backport translations of `component`. `languages` restricts the run;
/// `None` processes every translated language. English and the fix
/// pseudo-language are never touched.
#[instrument(skip(store, registry, languages))]
pub fn backport_translations(
    store: &dyn HistoryStore,
    registry: &VersionRegistry,
    component: &str,
    languages: Option<&[String]>,
    timestamp: Option<i64>,
) -> Result<BackportReport> {
    let english_since = first_appearance(store, component, ENGLISH)?;
    let languages: BTreeSet<String> = match languages {
        Some(languages) => languages.iter().cloned().collect(),
        None => store.languages()?,
    };
    let translatable = registry.list_translatable()?;
    let all_versions = registry.list_all()?;
    let meta = CommitMeta::new(BACKPORT_AUTHOR).with_source(CommitSource::Backport);
    let options = CommitOptions {
        timestamp,
        ..Default::default()
    };

    let mut report = BackportReport::default();
    for language in languages
        .iter()
        .filter(|lang| *lang != ENGLISH && *lang != FIX_LANGUAGE)
    {
        // string id -> [englishsince, translatedsince)
        let ranges: BTreeMap<String, (i32, i32)> = first_appearance(store, component, language)?
            .into_iter()
            .filter_map(|(id, translated)| {
                let english = *english_since.get(&id)?;
                (english < translated).then_some((id, (english, translated)))
            })
            .collect();
        if ranges.is_empty() {
            continue;
        }

        for target in &translatable {
            // translations picked for this branch, merged below against its current state
            let mut picked = Component::new(component, language.as_str(), target.clone());
            for (id, (english_since, translated_since)) in &ranges {
                if target.code() < *english_since || target.code() >= *translated_since {
                    continue;
                }
                let ids = [id.clone()];
                let Some(english) = resolve_one(store, component, ENGLISH, target, &ids)? else {
                    continue;
                };

                let candidates = all_versions
                    .iter()
                    .filter(|v| v.code() > target.code() && v.code() <= *translated_since);
                for candidate in candidates {
                    let Some(translation) = resolve_one(store, component, language, candidate, &ids)? else {
                        continue;
                    };
                    let Some(source_english) = resolve_one(store, component, ENGLISH, candidate, &ids)? else {
                        continue;
                    };
                    if english.differ(&source_english) {
                        continue;
                    }
                    debug!(string = %id, from = candidate.code(), to = target.code(), "backport candidate");
                    picked.add_string(translation, InsertPolicy::Overwrite)?;
                    break;
                }
            }
            if picked.is_empty() {
                continue;
            }

            let current = from_snapshot(store, component, language, target, SnapshotOptions::default())?;
            let mut stage = Stage::new();
            merge_translations(&picked, &current, &mut stage)?;

            let strings = stage.analyze().strings;
            let message = format!(
                "Backport {component} translations into {} {}",
                language,
                target.label()
            );
            if let Some(commit_id) = stage.commit(store, &message, &meta, &options)? {
                report.commits.push(commit_id);
                report.strings += strings;
            }
        }
    }

    if !report.commits.is_empty() {
        info!(commits = report.commits.len(), strings = report.strings, "backport finished");
    }
    Ok(report)
}

/// Translated `(component, languages)` pairs staged in `stage`.
pub fn touched_translations(stage: &Stage) -> BTreeMap<String, Vec<String>> {
    let mut touched: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for staged in stage.components() {
        if staged.language() == ENGLISH || staged.language() == FIX_LANGUAGE || staged.is_empty() {
            continue;
        }
        touched
            .entry(staged.name().to_string())
            .or_default()
            .insert(staged.language().to_string());
    }
    touched
        .into_iter()
        .map(|(name, languages)| (name, languages.into_iter().collect()))
        .collect()
}

/// Commit `stage` through [`Stage::commit_with_retry`], then backport the
/// translations it touched onto older branches.
#[instrument(skip_all)]
pub fn commit_and_backport(
    stage: &mut Stage,
    store: &dyn HistoryStore,
    registry: &VersionRegistry,
    message: &str,
    meta: &CommitMeta,
    policy: RetryPolicy,
) -> Result<(Option<CommitId>, BackportReport)> {
    let touched = touched_translations(stage);
    let Some(commit_id) = stage.commit_with_retry(store, message, meta, policy)? else {
        return Ok((None, BackportReport::default()));
    };

    let mut report = BackportReport::default();
    for (component, languages) in &touched {
        let part = backport_translations(store, registry, component, Some(languages), None)?;
        report.commits.extend(part.commits);
        report.strings += part.strings;
    }
    Ok((Some(commit_id), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryHistory;
    use crate::test_support::{registry, seed, version};

    fn text(store: &MemoryHistory, lang: &str, code: i32, id: &str) -> Option<String> {
        from_snapshot(store, "forum", lang, &version(code), SnapshotOptions::default())
            .unwrap()
            .get_string(id)
            .and_then(|s| s.text.clone())
    }

    #[test]
    fn identical_english_receives_translation() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "forum", "en", 400, 1, &[("post", Some("Post"))]);
        seed(&store, "forum", "fr", 402, 2, &[("post", Some("Message"))]);

        let report = backport_translations(&store, &registry(), "forum", None, Some(100))?;
        assert_eq!(report.commits.len(), 1);
        assert_eq!(report.strings, 1);
        for code in [400, 401, 402, 403] {
            assert_eq!(text(&store, "fr", code, "post").as_deref(), Some("Message"), "{code}");
        }
        let commit = store.commit_info(report.commits[0])?.unwrap();
        assert_eq!(commit.source, CommitSource::Backport);

        let again = backport_translations(&store, &registry(), "forum", None, Some(200))?;
        assert_eq!(again, BackportReport::default());
        Ok(())
    }

    #[test]
    fn changed_english_limits_the_range() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "forum", "en", 400, 1, &[("reply", Some("Old reply"))]);
        seed(&store, "forum", "en", 401, 2, &[("reply", Some("Reply"))]);
        seed(&store, "forum", "de", 402, 3, &[("reply", Some("Antworten"))]);

        backport_translations(&store, &registry(), "forum", None, None)?;
        assert_eq!(text(&store, "de", 400, "reply"), None);
        assert_eq!(text(&store, "de", 401, "reply").as_deref(), Some("Antworten"));
        Ok(())
    }

    #[test]
    fn fix_language_and_unlisted_languages_are_skipped() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "forum", "en", 400, 1, &[("post", Some("Post"))]);
        seed(&store, "forum", "en_fix", 402, 2, &[("post", Some("Posting"))]);
        seed(&store, "forum", "fr", 402, 2, &[("post", Some("Message"))]);
        seed(&store, "forum", "cs", 402, 2, &[("post", Some("Příspěvek"))]);

        let only_cs = vec!["cs".to_string(), FIX_LANGUAGE.to_string()];
        let report = backport_translations(&store, &registry(), "forum", Some(&only_cs), None)?;
        assert_eq!(report.strings, 1);
        assert_eq!(text(&store, "cs", 400, "post").as_deref(), Some("Příspěvek"));
        assert_eq!(text(&store, "fr", 400, "post"), None);
        assert_eq!(text(&store, "en_fix", 400, "post"), None);
        Ok(())
    }

    #[test]
    fn commit_backports_what_it_touched() -> Result<()> {
        let store = MemoryHistory::new();
        seed(&store, "forum", "en", 400, 1, &[("post", Some("Post"))]);
        seed(&store, "forum", "en", 400, 1, &[("reply", Some("Reply"))]);

        let mut fr = Component::new("forum", "fr", version(402));
        fr.add_string(LangString::new("post", "Message", 10), InsertPolicy::Fail)?;
        let mut en = Component::new("forum", "en", version(402));
        en.add_string(LangString::new("reply", "Reply", 10), InsertPolicy::Fail)?;
        let mut stage = Stage::new();
        stage.add(&fr, InsertPolicy::Fail)?;
        stage.add(&en, InsertPolicy::Fail)?;
        assert_eq!(
            touched_translations(&stage),
            BTreeMap::from([("forum".to_string(), vec!["fr".to_string()])])
        );

        let meta = CommitMeta::new("Jo Translator");
        let (commit_id, report) =
            commit_and_backport(&mut stage, &store, &registry(), "translate post", &meta, RetryPolicy::default())?;
        assert!(commit_id.is_some());
        assert_eq!(report.commits.len(), 1);
        assert_eq!(text(&store, "fr", 400, "post").as_deref(), Some("Message"));
        assert_eq!(text(&store, "fr", 401, "post").as_deref(), Some("Message"));
        Ok(())
    }
}
