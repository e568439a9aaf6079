use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use amos_core::backport::commit_and_backport;
use amos_core::script::{ScriptContext, execute_script, extract_script_from_text};
use amos_core::{CommitMeta, CommitSource, InsertPolicy, PersistentStage, RetryPolicy, log_info, log_warn};

use crate::commands::report_commit;
use crate::repo::Repo;

#[derive(Parser)]
pub struct ScriptCli {
    /// Branch the script runs on.
    pub version: String,
    /// File holding a commit message with an `AMOS BEGIN` block.
    pub message: PathBuf,
    #[arg(long, default_value = "AMOS-bot")]
    pub author: String,
    #[arg(long)]
    pub email: Option<String>,
    /// Keep the result in this stage instead of committing it.
    #[arg(long)]
    pub stage: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub owner: u64,
}

impl ScriptCli {
    pub fn handle(&self, repo: &Repo) -> Result<()> {
        let version = repo.version(&self.version)?;
        let message = std::fs::read_to_string(&self.message)
            .with_context(|| format!("cannot read {}", self.message.display()))?;
        let lines = extract_script_from_text(&message);
        if lines.is_empty() {
            println!("No AMOScript found in {}", self.message.display());
            return Ok(());
        }

        let mut ctx = ScriptContext::new(&repo.history).with_languages(repo.config.languages.clone());
        if let Some(help_root) = repo.config.help_root.as_deref() {
            ctx = ctx.with_help_root(Path::new(help_root));
        }
        let run = execute_script(&ctx, &lines, &version, None)?;
        log_info!(executed = run.executed, total = lines.len(), "script executed");

        if let Some(failure) = &run.failure {
            log_warn!(status = failure.status.code(), instruction = %failure.instruction, "script stopped");
            bail!("{failure}");
        }
        if run.stage.is_empty() {
            println!("Script executed, nothing to commit");
            return Ok(());
        }

        if let Some(stage_id) = &self.stage {
            let mut persistent = PersistentStage::restore(self.owner, stage_id.as_str(), &*repo.blobs)?;
            for component in run.stage.components() {
                persistent.add(component, InsertPolicy::Overwrite)?;
            }
            persistent.store(&*repo.blobs)?;
            println!("Staged {} strings into {stage_id}", persistent.analyze().strings);
            return Ok(());
        }

        let mut meta = CommitMeta::new(self.author.as_str()).with_source(CommitSource::CommitScript);
        if let Some(email) = &self.email {
            meta = meta.with_email(email.as_str());
        }
        let mut stage = run.stage;
        let (commit_id, backported) = commit_and_backport(
            &mut stage,
            &repo.history,
            &repo.registry,
            message.trim(),
            &meta,
            RetryPolicy::from_config(repo.config),
        )?;
        report_commit(commit_id, &backported);
        Ok(())
    }
}
