use anyhow::Result;
use clap::Parser;
use tabled::{Table, Tabled};

use crate::repo::Repo;

#[derive(Tabled)]
struct VersionRow {
    code: i32,
    label: String,
    branch: String,
    directory: String,
    translatable: bool,
}

#[derive(Parser)]
pub struct VersionsCli {
    /// Only list branches that accept translations.
    #[arg(long)]
    pub translatable: bool,
}

impl VersionsCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let versions = if self.translatable {
            repo.registry.list_translatable()?
        } else {
            repo.registry.list_all()?
        };
        let rows: Vec<VersionRow> = versions
            .iter()
            .map(|v| VersionRow {
                code: v.code(),
                label: v.label().to_string(),
                branch: v.branch_name(),
                directory: v.directory().to_string(),
                translatable: v.translatable(),
            })
            .collect();
        println!("{}", Table::new(rows));
        Ok(())
    }
}
