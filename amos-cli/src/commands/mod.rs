mod backport;
mod diff;
mod script;
mod show;
mod stage;
mod stash;
mod versions;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use amos_core::backport::BackportReport;
use amos_core::storage::CommitId;

use crate::repo::Repo;

#[derive(Parser)]
#[command(name = "amos")]
#[command(about = "Command line interface for the amos translation repository", long_about = None)]
pub struct Cli {
    /// 配置文件路径，默认读取 AMOS_CONFIG_PATH 或 ./amos.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        match &self.command {
            Commands::Versions(versions_cli) => versions_cli.handle(repo),
            Commands::Show(show_cli) => show_cli.handle(repo),
            Commands::History(history_cli) => history_cli.handle(repo),
            Commands::Script(script_cli) => script_cli.handle(repo),
            Commands::Diff(diff_cli) => diff_cli.handle(),
            Commands::Stage(stage_cli) => stage_cli.handle(repo),
            Commands::Stash(stash_cli) => stash_cli.handle(repo),
            Commands::Backport(backport_cli) => backport_cli.handle(repo),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 列出已知的分支版本
    Versions(versions::VersionsCli),
    /// 显示某个组件在某个版本上的快照
    Show(show::ShowCli),
    /// 显示单个字符串的完整历史
    History(show::HistoryCli),
    /// 执行提交信息中的 AMOScript
    Script(script::ScriptCli),
    /// 逐词比较两段文本
    Diff(diff::DiffCli),
    /// 管理暂存区
    Stage(stage::StageCli),
    /// 管理暂存快照
    Stash(stash::StashCli),
    /// 将翻译回填到旧分支
    Backport(backport::BackportCli),
}

pub(crate) fn report_commit(commit_id: Option<CommitId>, backported: &BackportReport) {
    match commit_id {
        Some(commit_id) => println!("Committed as {commit_id}"),
        None => println!("Nothing changed"),
    }
    if !backported.commits.is_empty() {
        println!(
            "Backported {} strings in {} commits",
            backported.strings,
            backported.commits.len()
        );
    }
}
