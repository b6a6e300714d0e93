//! Subcommand handlers.
//!
//! Handlers write their output to a caller-supplied writer and receive their
//! loader and repository explicitly, so they run the same against stdout and
//! the real state file as against a buffer and an in-memory repository.

pub mod identity;
pub mod policy;

use std::path::PathBuf;

use anyhow::{Context, Result};
use policy_tree::{LocalRepository, PolicyLoader};
use tracing::{Level, instrument};

use crate::cli::{Cli, Commands};
use crate::settings::RepoSettings;

/// Settings resolved from the command line and the settings file.
#[derive(Debug, Clone)]
pub struct CmdContext {
    pub settings: RepoSettings,
    pub state_override: Option<PathBuf>,
}

impl CmdContext {
    pub fn loader(&self) -> Result<PolicyLoader> {
        Ok(PolicyLoader::new(self.settings.loader_config()?))
    }

    /// Opens the local repository. Nothing touches the state file before this.
    pub fn open_repository(&self) -> Result<LocalRepository> {
        let path = self.settings.state_file(self.state_override.as_deref())?;
        let repo = LocalRepository::open(&path)
            .with_context(|| format!("unable to open repository at {}", path.display()))?;
        Ok(repo.with_merge_strategy(self.settings.merge))
    }
}

#[instrument(level = Level::TRACE, skip(cli))]
pub fn run(cli: Cli) -> Result<()> {
    let ctx = CmdContext {
        settings: RepoSettings::load(cli.settings.as_deref())?,
        state_override: cli.state,
    };
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Policy(cmd) => policy::run(cmd, &ctx, &mut stdout),
    }
}
