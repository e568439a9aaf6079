use anyhow::Result;
use clap::Parser;
use tabled::{Table, Tabled};

use amos_core::snapshot::string_timeline;
use amos_core::{SnapshotOptions, from_snapshot};

use crate::repo::{Repo, format_time};

#[derive(Tabled)]
struct StringRow {
    id: String,
    text: String,
    modified: String,
}

#[derive(Tabled)]
struct RecordRow {
    record: u64,
    commit: u64,
    since: i32,
    modified: String,
    text: String,
}

fn display_text(text: Option<&str>) -> String {
    text.map(str::to_string).unwrap_or_else(|| "<deleted>".to_string())
}

#[derive(Parser)]
pub struct ShowCli {
    pub component: String,
    pub language: String,
    /// Branch code, directory (`4.1`) or branch name.
    pub version: String,
    /// Only consider changes made up to this unix timestamp.
    #[arg(long)]
    pub at: Option<i64>,
    /// Include deleted strings.
    #[arg(long)]
    pub deleted: bool,
    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

impl ShowCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let version = repo.version(&self.version)?;
        let mut options = SnapshotOptions::default();
        if let Some(at) = self.at {
            options = options.at(at);
        }
        if self.deleted {
            options = options.with_deleted();
        }

        let component = from_snapshot(&repo.history, &self.component, &self.language, &version, options)?;
        let strings: Vec<_> = component.strings().collect();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&strings)?);
            return Ok(());
        }

        let rows: Vec<StringRow> = strings
            .iter()
            .map(|s| StringRow {
                id: s.id.clone(),
                text: display_text(s.text.as_deref()),
                modified: format_time(s.timestamp),
            })
            .collect();
        println!("{}", Table::new(rows));
        println!(
            "{} strings in {} {} ({})",
            component.len(),
            component.name(),
            component.language(),
            version.label()
        );
        Ok(())
    }
}

#[derive(Parser)]
pub struct HistoryCli {
    pub component: String,
    pub language: String,
    pub string_id: String,
}

impl HistoryCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let timeline = string_timeline(&repo.history, &self.component, &self.language, &self.string_id)?;
        if timeline.is_empty() {
            println!("No history for [{},{}] in {}", self.string_id, self.component, self.language);
            return Ok(());
        }
        let rows: Vec<RecordRow> = timeline
            .into_iter()
            .map(|r| RecordRow {
                record: r.id,
                commit: r.commit_id,
                since: r.since,
                modified: format_time(r.timestamp),
                text: display_text(r.text.as_deref()),
            })
            .collect();
        println!("{}", Table::new(rows));
        Ok(())
    }
}
