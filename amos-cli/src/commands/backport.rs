use anyhow::Result;
use clap::Parser;

use amos_core::backport::backport_translations;

use crate::repo::Repo;

#[derive(Parser)]
pub struct BackportCli {
    pub component: String,
    /// Restrict to these languages; every translated language by default.
    #[arg(long = "lang")]
    pub languages: Vec<String>,
}

impl BackportCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let languages = (!self.languages.is_empty()).then_some(self.languages.as_slice());
        let report = backport_translations(&repo.history, &repo.registry, &self.component, languages, None)?;
        if report.commits.is_empty() {
            println!("Nothing to backport for {}", self.component);
        } else {
            println!(
                "Backported {} strings of {} in {} commits",
                report.strings,
                self.component,
                report.commits.len()
            );
        }
        Ok(())
    }
}
