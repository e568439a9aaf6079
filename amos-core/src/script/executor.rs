use std::fs;
use std::io;
use std::path::{Component as PathComponent, Path};

use tracing::{debug, instrument};

use super::frankenstyle::legacy_component_name;
use super::parser::{Instruction, StringRef, parse_instruction};
use super::{ScriptError, ScriptStatus};
use crate::error::Result;
use crate::model::{Component, InsertPolicy, LangString};
use crate::snapshot::{SnapshotOptions, from_snapshot, known_languages};
use crate::stage::Stage;
use crate::storage::HistoryStore;
use crate::unix_now;
use crate::version::Version;

/// What a script runs against.
pub struct ScriptContext<'a> {
    pub store: &'a dyn HistoryStore,
    /// Languages to process; empty means every language in history.
    pub languages: Vec<String>,
    /// Root of `<lang>/<path>` help files for `HLP`.
    pub help_root: Option<&'a Path>,
}

impl<'a> ScriptContext<'a> {
    pub fn new(store: &'a dyn HistoryStore) -> Self {
        Self {
            store,
            languages: Vec::new(),
            help_root: None,
        }
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_help_root(mut self, help_root: &'a Path) -> Self {
        self.help_root = Some(help_root);
        self
    }
}

/// Staged changes of one instruction, or why it was refused.
pub type ScriptOutcome = std::result::Result<Stage, ScriptError>;

#[derive(Debug, Default)]
pub struct ScriptRun {
    /// Changes of every successfully executed instruction.
    pub stage: Stage,
    pub executed: usize,
    /// The instruction that stopped the run.
    pub failure: Option<ScriptError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    Copy,
    Forced,
    Move,
}

/// Legacy names of both ends of a copy.
struct Resolved<'r> {
    from: &'r StringRef,
    from_component: String,
    to: &'r StringRef,
    to_component: String,
}

fn resolve_component(line: &str, name: &str) -> std::result::Result<String, ScriptError> {
    legacy_component_name(name).ok_or_else(|| {
        ScriptError::new(
            ScriptStatus::InvalidComponent,
            line,
            format!("invalid component name '{name}'"),
        )
    })
}

/// Run one instruction on `version` for every translation language and
/// return the staged result. The caller rebases and commits it.
///
/// `Err` is reserved for repository failures; refused instructions come
/// back as `Ok(Err(ScriptError))`.
#[instrument(skip(ctx, version), fields(version = version.code()))]
pub fn execute(
    ctx: &ScriptContext<'_>,
    instruction: &str,
    version: &Version,
    timestamp: Option<i64>,
) -> Result<ScriptOutcome> {
    let line = instruction.trim();
    let parsed = match parse_instruction(line) {
        Ok(parsed) => parsed,
        Err(err) => return Ok(Err(err)),
    };
    let timestamp = timestamp.unwrap_or_else(unix_now);

    let (mode, from, to) = match &parsed {
        Instruction::Copy { from, to } => (CopyMode::Copy, from, to),
        Instruction::ForcedCopy { from, to } => (CopyMode::Forced, from, to),
        Instruction::Move { from, to } => (CopyMode::Move, from, to),
        Instruction::HelpMigration { path, to } => {
            let to_component = match resolve_component(line, &to.component) {
                Ok(name) => name,
                Err(err) => return Ok(Err(err)),
            };
            return migrate_help(ctx, line, path, &to.string_id, &to_component, version, timestamp);
        }
        Instruction::Remark(_) => return Ok(Ok(Stage::new())),
    };

    let resolved = match (
        resolve_component(line, &from.component),
        resolve_component(line, &to.component),
    ) {
        (Ok(from_component), Ok(to_component)) => Resolved {
            from,
            from_component,
            to,
            to_component,
        },
        (Err(err), _) | (_, Err(err)) => return Ok(Err(err)),
    };
    copy_string(ctx, mode, &resolved, version, timestamp).map(Ok)
}

fn stage_string(stage: &mut Stage, name: &str, language: &str, version: &Version, string: LangString) -> Result<()> {
    let mut component = Component::new(name, language, version.clone());
    component.add_string(string, InsertPolicy::Overwrite)?;
    stage.add(&component, InsertPolicy::Overwrite)
}

fn copy_string(
    ctx: &ScriptContext<'_>,
    mode: CopyMode,
    r: &Resolved<'_>,
    version: &Version,
    timestamp: i64,
) -> Result<Stage> {
    let mut stage = Stage::new();
    let same_string = r.from_component == r.to_component && r.from.string_id == r.to.string_id;
    let source_ids = [r.from.string_id.clone()];
    let target_ids = [r.to.string_id.clone()];

    for language in known_languages(ctx.store, &ctx.languages)? {
        let source = from_snapshot(
            ctx.store,
            &r.from_component,
            &language,
            version,
            SnapshotOptions::default().only(&source_ids),
        )?;
        let Some(text) = source
            .get_string(&r.from.string_id)
            .and_then(|s| s.visible_text())
        else {
            continue;
        };

        let target = from_snapshot(
            ctx.store,
            &r.to_component,
            &language,
            version,
            SnapshotOptions::default().only(&target_ids),
        )?;
        let copy = mode == CopyMode::Forced || !target.has_live_string(&r.to.string_id);
        debug!(language = %language, copy, "script copy decision");
        if copy {
            stage_string(
                &mut stage,
                &r.to_component,
                &language,
                version,
                LangString::new(r.to.string_id.clone(), text, timestamp),
            )?;
        }
        // 目标已存在时 MOV 与 CPY 一样被拒绝，源字符串保持不变
        if mode == CopyMode::Move && copy && !same_string {
            stage_string(
                &mut stage,
                &r.from_component,
                &language,
                version,
                LangString::tombstone(r.from.string_id.clone(), timestamp),
            )?;
        }
    }
    Ok(stage)
}

fn is_safe_relative(path: &Path) -> bool {
    path.components()
        .all(|part| matches!(part, PathComponent::Normal(_)))
}

fn migrate_help(
    ctx: &ScriptContext<'_>,
    line: &str,
    path: &str,
    string_id: &str,
    component: &str,
    version: &Version,
    timestamp: i64,
) -> Result<ScriptOutcome> {
    let relative = Path::new(path);
    if !is_safe_relative(relative) {
        return Ok(Err(ScriptError::new(
            ScriptStatus::SyntaxError,
            line,
            format!("help path '{path}' must be relative"),
        )));
    }
    let mut stage = Stage::new();
    let Some(root) = ctx.help_root else {
        debug!("no help root configured, skipping help migration");
        return Ok(Ok(stage));
    };
    let target_ids = [string_id.to_string()];

    for language in known_languages(ctx.store, &ctx.languages)? {
        let file = root.join(&language).join(relative);
        let content = match fs::read_to_string(&file) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        let text = content.trim();
        if text.is_empty() {
            continue;
        }
        let target = from_snapshot(
            ctx.store,
            component,
            &language,
            version,
            SnapshotOptions::default().only(&target_ids),
        )?;
        if target.has_live_string(string_id) {
            continue;
        }
        stage_string(
            &mut stage,
            component,
            &language,
            version,
            LangString::new(string_id, text, timestamp),
        )?;
    }
    Ok(Ok(stage))
}

/// Run `lines` in order, stopping at the first refused instruction.
pub fn execute_script(
    ctx: &ScriptContext<'_>,
    lines: &[String],
    version: &Version,
    timestamp: Option<i64>,
) -> Result<ScriptRun> {
    let mut run = ScriptRun::default();
    for line in lines {
        match execute(ctx, line, version, timestamp)? {
            Ok(stage) => {
                for component in stage.components() {
                    run.stage.add(component, InsertPolicy::Overwrite)?;
                }
                run.executed += 1;
            }
            Err(err) => {
                run.failure = Some(err);
                break;
            }
        }
    }
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{CommitMeta, CommitOptions};
    use crate::storage::{CommitSource, MemoryHistory};
    use crate::test_support::{seed, version};

    fn repository() -> MemoryHistory {
        let store = MemoryHistory::new();
        seed(&store, "a", "en", 400, 10, &[("foo", Some("Foo")), ("taken", Some("Taken"))]);
        seed(&store, "a", "fr", 400, 10, &[("foo", Some("Fou")), ("taken", Some("Pris"))]);
        seed(&store, "a", "de", 400, 10, &[("foo", Some("Fuu"))]);
        seed(&store, "a", "cs", 400, 10, &[("other", Some("Jiny"))]);
        store
    }

    fn snapshot_text(store: &MemoryHistory, component: &str, lang: &str, id: &str) -> Option<String> {
        from_snapshot(store, component, lang, &version(400), SnapshotOptions::default())
            .unwrap()
            .get_string(id)
            .and_then(|s| s.text.clone())
    }

    fn run(store: &MemoryHistory, line: &str) -> Stage {
        let ctx = ScriptContext::new(store);
        execute(&ctx, line, &version(400), Some(50)).unwrap().unwrap()
    }

    #[test]
    fn copy_reaches_every_translated_language() -> Result<()> {
        let store = repository();
        let mut stage = run(&store, "CPY [foo,mod_a],[bar,mod_a]");
        assert_eq!(stage.analyze().languages, "de,fr");

        let meta = CommitMeta::new("script").with_source(CommitSource::CommitScript);
        stage.commit(&store, "copy foo", &meta, &CommitOptions::default())?;
        assert_eq!(snapshot_text(&store, "a", "fr", "bar").as_deref(), Some("Fou"));
        assert_eq!(snapshot_text(&store, "a", "de", "bar").as_deref(), Some("Fuu"));
        assert_eq!(snapshot_text(&store, "a", "cs", "bar"), None);
        assert_eq!(snapshot_text(&store, "a", "en", "bar"), None);
        Ok(())
    }

    #[test]
    fn copy_keeps_existing_destination_unless_forced() {
        let store = repository();
        let stage = run(&store, "CPY [foo,mod_a],[taken,mod_a]");
        assert!(!stage.has_component("a", "fr", &version(400)));
        assert!(stage.has_component("a", "de", &version(400)));

        let forced = run(&store, "FCP [foo,mod_a],[taken,mod_a]");
        let fr = forced.get_component("a", "fr", &version(400)).unwrap();
        assert_eq!(fr.get_string("taken").unwrap().text.as_deref(), Some("Fou"));
    }

    #[test]
    fn move_tombstones_the_source() {
        let store = repository();
        let stage = run(&store, "MOV [foo,mod_a],[renamed,core]");
        let moved = stage.get_component("moodle", "fr", &version(400)).unwrap();
        assert_eq!(moved.get_string("renamed").unwrap().text.as_deref(), Some("Fou"));
        let source = stage.get_component("a", "fr", &version(400)).unwrap();
        assert!(source.get_string("foo").unwrap().deleted);

        let onto_itself = run(&store, "MOV [foo,mod_a],[foo,mod_a]");
        assert!(onto_itself.is_empty());
    }

    #[test]
    fn move_onto_existing_destination_keeps_both_strings() -> Result<()> {
        let store = repository();
        seed(&store, "a", "fr", 400, 10, &[("bar", Some("Barre"))]);
        let ctx = ScriptContext::new(&store).with_languages(vec!["fr".to_string()]);

        let mut stage = execute(&ctx, "MOV [foo,mod_a],[bar,mod_a]", &version(400), Some(50))?.unwrap();
        assert!(stage.is_empty());

        let meta = CommitMeta::new("script").with_source(CommitSource::CommitScript);
        assert_eq!(stage.commit(&store, "move foo", &meta, &CommitOptions::default())?, None);
        assert_eq!(snapshot_text(&store, "a", "fr", "foo").as_deref(), Some("Fou"));
        assert_eq!(snapshot_text(&store, "a", "fr", "bar").as_deref(), Some("Barre"));
        Ok(())
    }

    #[test]
    fn refused_instructions_are_values() {
        let store = repository();
        let ctx = ScriptContext::new(&store);
        let v = version(400);
        let cases = [
            ("XXX [a,b],[c,d]", ScriptStatus::UnknownInstruction),
            ("CPY [foo,mod_a]", ScriptStatus::SyntaxError),
            ("CPY [foo,Mod-A],[bar,mod_a]", ScriptStatus::InvalidComponent),
            ("HLP ../secret,[bar,mod_a]", ScriptStatus::SyntaxError),
        ];
        for (line, status) in cases {
            let err = execute(&ctx, line, &v, None).unwrap().unwrap_err();
            assert_eq!(err.status, status, "{line}");
        }
        assert!(execute(&ctx, "REM hello", &v, None).unwrap().unwrap().is_empty());
    }

    #[test]
    fn help_files_are_migrated() -> Result<()> {
        let store = repository();
        seed(&store, "forum", "de", 400, 10, &[("subscription_help", Some("Schon da"))]);
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("fr").join("forum"))?;
        fs::create_dir_all(dir.path().join("de").join("forum"))?;
        fs::write(dir.path().join("fr/forum/subscription.html"), "  <p>Abonnement</p>\n")?;
        fs::write(dir.path().join("de/forum/subscription.html"), "<p>Abo</p>")?;

        let ctx = ScriptContext::new(&store).with_help_root(dir.path());
        let stage = execute(
            &ctx,
            "HLP forum/subscription.html,[subscription_help,mod_forum]",
            &version(400),
            Some(5),
        )?
        .unwrap();
        assert_eq!(stage.analyze().languages, "fr");
        let fr = stage.get_component("forum", "fr", &version(400)).unwrap();
        assert_eq!(
            fr.get_string("subscription_help").unwrap().text.as_deref(),
            Some("<p>Abonnement</p>")
        );
        Ok(())
    }

    #[test]
    fn script_stops_at_first_failure() -> Result<()> {
        let store = repository();
        let ctx = ScriptContext::new(&store).with_languages(vec!["fr".to_string()]);
        let lines = vec![
            "CPY [foo,mod_a],[one,mod_a]".to_string(),
            "BAD".to_string(),
            "CPY [foo,mod_a],[two,mod_a]".to_string(),
        ];
        let run = execute_script(&ctx, &lines, &version(400), Some(50))?;
        assert_eq!(run.executed, 1);
        assert_eq!(run.failure.unwrap().status, ScriptStatus::UnknownInstruction);
        let fr = run.stage.get_component("a", "fr", &version(400)).unwrap();
        assert!(fr.has_string("one"));
        assert!(!fr.has_string("two"));
        assert_eq!(run.stage.len(), 1);
        Ok(())
    }
}
