use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tabled::{Table, Tabled};

use amos_core::{PersistentStage, Stash};

use crate::repo::{Repo, format_time};

#[derive(Tabled)]
struct StashRow {
    id: u64,
    owner: u64,
    name: String,
    strings: usize,
    languages: String,
    components: String,
    modified: String,
}

impl From<&Stash> for StashRow {
    fn from(stash: &Stash) -> Self {
        Self {
            id: stash.id.unwrap_or_default(),
            owner: stash.owner_id,
            name: stash.name.clone(),
            strings: stash.strings,
            languages: stash.languages.clone(),
            components: stash.components.clone(),
            modified: format_time(stash.modified_at),
        }
    }
}

#[derive(Tabled)]
struct StagedRow {
    component: String,
    language: String,
    version: String,
    strings: usize,
}

#[derive(Parser)]
pub struct StashCli {
    #[command(subcommand)]
    pub stash_commands: StashCommands,
}

impl StashCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        match &self.stash_commands {
            StashCommands::Save(save_cli) => save_cli.handle(repo),
            StashCommands::List(list_cli) => list_cli.handle(repo),
            StashCommands::Show(show_cli) => show_cli.handle(repo),
            StashCommands::Apply(apply_cli) => apply_cli.handle(repo),
            StashCommands::Drop(drop_cli) => drop_cli.handle(repo),
        }
    }
}

#[derive(Subcommand)]
pub enum StashCommands {
    /// 将暂存区保存为快照
    Save(SaveCli),
    List(ListCli),
    Show(ShowCli),
    /// 将快照应用到暂存区
    Apply(ApplyCli),
    Drop(DropCli),
}

fn load(repo: &Repo, id: u64) -> Result<Stash> {
    repo.stash_pool()
        .get(id)?
        .ok_or_else(|| anyhow!("stash {id} does not exist"))
}

#[derive(Parser)]
pub struct SaveCli {
    /// Stage to freeze.
    #[arg(long)]
    pub stage: String,
    #[arg(long, default_value_t = 0)]
    pub owner: u64,
    #[arg(long)]
    pub name: String,
    #[arg(long, short, default_value = "")]
    pub message: String,
}

impl SaveCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let stage = PersistentStage::restore(self.owner, self.stage.as_str(), &*repo.blobs)?;
        if stage.is_empty() {
            println!("Stage {} is empty", self.stage);
            return Ok(());
        }
        let mut stash =
            Stash::instance_from_stage(&stage, self.owner, self.name.as_str())?.with_message(self.message.as_str());
        let id = repo.stash_pool().push(&mut stash)?;
        println!("Saved stash {id}");
        Ok(())
    }
}

#[derive(Parser)]
pub struct ListCli {
    #[arg(long)]
    pub owner: Option<u64>,
}

impl ListCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let stashes = repo.stash_pool().list(self.owner)?;
        let rows: Vec<StashRow> = stashes.iter().map(StashRow::from).collect();
        println!("{}", Table::new(rows));
        Ok(())
    }
}

#[derive(Parser)]
pub struct ShowCli {
    pub id: u64,
}

impl ShowCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let stash = load(repo, self.id)?;
        println!("{}", Table::new([StashRow::from(&stash)]));
        if !stash.message.is_empty() {
            println!("{}", stash.message);
        }

        let stage = stash.restore_stage()?;
        let rows: Vec<StagedRow> = stage
            .components()
            .into_iter()
            .map(|c| StagedRow {
                component: c.name().to_string(),
                language: c.language().to_string(),
                version: c.version().label().to_string(),
                strings: c.len(),
            })
            .collect();
        println!("{}", Table::new(rows));
        Ok(())
    }
}

#[derive(Parser)]
pub struct ApplyCli {
    pub id: u64,
    /// Stage receiving the stashed strings.
    #[arg(long)]
    pub stage: String,
    #[arg(long, default_value_t = 0)]
    pub owner: u64,
}

impl ApplyCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let stash = load(repo, self.id)?;
        let mut stage = PersistentStage::restore(self.owner, self.stage.as_str(), &*repo.blobs)?;
        stash
            .apply(&mut stage)
            .with_context(|| format!("cannot apply stash {}", self.id))?;
        stage.store(&*repo.blobs)?;
        println!("Applied stash {} onto {}", self.id, self.stage);
        Ok(())
    }
}

#[derive(Parser)]
pub struct DropCli {
    pub id: u64,
}

impl DropCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let stash = load(repo, self.id)?;
        repo.stash_pool().drop_stash(&stash)?;
        println!("Dropped stash {}", self.id);
        Ok(())
    }
}
