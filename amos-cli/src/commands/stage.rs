use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};

use amos_core::backport::commit_and_backport;
use amos_core::{
    CommitMeta, Component, InsertPolicy, LangString, PersistentStage, RetryPolicy, Version, unix_now,
};

use crate::commands::report_commit;
use crate::repo::Repo;

#[derive(Tabled)]
struct StagedStringRow {
    component: String,
    language: String,
    version: i32,
    id: String,
    text: String,
}

#[derive(Parser)]
pub struct StageCli {
    #[arg(long, default_value = "default")]
    pub stage: String,
    #[arg(long, default_value_t = 0)]
    pub owner: u64,
    #[command(subcommand)]
    pub stage_commands: StageCommands,
}

impl StageCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let mut stage = PersistentStage::restore(self.owner, self.stage.as_str(), &*repo.blobs)?;
        match &self.stage_commands {
            StageCommands::Add {
                component,
                language,
                version,
                string_id,
                text,
            } => {
                let edited = edited_component(
                    component,
                    language,
                    repo.version(version)?,
                    [(string_id.clone(), text.clone())],
                    unix_now(),
                )?;
                stage.add(&edited, InsertPolicy::Overwrite)?;
                stage.store(&*repo.blobs)?;
                println!("Staged [{string_id},{component}] for {language}");
            }
            StageCommands::Import {
                component,
                language,
                version,
                file,
            } => {
                let raw = std::fs::read_to_string(file)
                    .with_context(|| format!("cannot read {}", file.display()))?;
                let strings: BTreeMap<String, String> = serde_json::from_str(&raw)
                    .with_context(|| format!("{} is not a JSON object of strings", file.display()))?;
                let imported = edited_component(
                    component,
                    language,
                    repo.version(version)?,
                    strings.into_iter().map(|(id, text)| (id, Some(text))),
                    unix_now(),
                )?;
                stage.add(&imported, InsertPolicy::Overwrite)?;
                stage.store(&*repo.blobs)?;
                println!("Staged {} strings of {component} for {language}", imported.len());
            }
            StageCommands::Show => {
                let rows: Vec<StagedStringRow> = stage
                    .components()
                    .into_iter()
                    .flat_map(|c| {
                        c.strings().map(move |s| StagedStringRow {
                            component: c.name().to_string(),
                            language: c.language().to_string(),
                            version: c.version().code(),
                            id: s.id.clone(),
                            text: s.text.clone().unwrap_or_else(|| "<deleted>".to_string()),
                        })
                    })
                    .collect();
                println!("{}", Table::new(rows));
            }
            StageCommands::Commit { message, author } => {
                let meta = CommitMeta::new(author.as_str());
                let (commit_id, backported) = commit_and_backport(
                    &mut stage,
                    &repo.history,
                    &repo.registry,
                    message,
                    &meta,
                    RetryPolicy::from_config(repo.config),
                )?;
                report_commit(commit_id, &backported);
                if stage.is_empty() {
                    stage.discard(&*repo.blobs)?;
                } else {
                    stage.store(&*repo.blobs)?;
                }
            }
            StageCommands::Discard => {
                stage.discard(&*repo.blobs)?;
                println!("Discarded stage {}", self.stage);
            }
        }
        Ok(())
    }
}

/// Component holding the given edits; `None` text stages a deletion.
fn edited_component(
    name: &str,
    language: &str,
    version: Version,
    strings: impl IntoIterator<Item = (String, Option<String>)>,
    timestamp: i64,
) -> Result<Component> {
    let mut edited = Component::new(name, language, version);
    for (id, text) in strings {
        let string = match text {
            Some(text) => LangString::new(id, text, timestamp),
            None => LangString::tombstone(id, timestamp),
        };
        edited.add_string(string, InsertPolicy::Overwrite)?;
    }
    edited.clean_texts();
    Ok(edited)
}

#[derive(Subcommand)]
pub enum StageCommands {
    /// 暂存单个字符串，省略文本表示删除
    Add {
        component: String,
        language: String,
        version: String,
        string_id: String,
        text: Option<String>,
    },
    /// 从 JSON 对象 {"stringid": "text"} 批量导入字符串
    Import {
        component: String,
        language: String,
        version: String,
        file: PathBuf,
    },
    /// 显示暂存区中的字符串
    Show,
    /// 提交暂存区并回填旧分支
    Commit {
        #[arg(long, short)]
        message: String,
        #[arg(long)]
        author: String,
    },
    /// 清空并删除暂存区
    Discard,
}
