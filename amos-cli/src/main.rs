use anyhow::{Context, Result};
use clap::Parser;

use amos_core::config::holder;
use amos_core::logger::{LogConfig, Logger};

use crate::commands::Cli;
use crate::repo::Repo;

mod commands;
mod repo;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = holder::load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = Logger::builder()
        .config(LogConfig::from_entity(config)?)
        .build()
        .init()?;

    let repo = Repo::open(config)?;
    cli.handle(&repo)
}
