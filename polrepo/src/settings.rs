//! `~/.polrepo/settings.json` loading.
//!
//! ```json
//! {
//!   "ignore": ["\\.git", ".*\\.swp"],
//!   "merge": "strict",
//!   "state": "/var/lib/polrepo/state.json"
//! }
//! ```
//!
//! Every field is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs::home_dir;
use policy_tree::loader::DEFAULT_IGNORE_PATTERNS;
use policy_tree::{LoaderConfig, MergeStrategy};
use serde::{Deserialize, Serialize};
use tracing::{Level, debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoSettings {
    /// Regular expressions matched against whole entry base names.
    pub ignore: Vec<String>,

    pub merge: MergeStrategy,

    /// Local repository state file. Defaults to `~/.polrepo/state.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<PathBuf>,
}

impl Default for RepoSettings {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            merge: MergeStrategy::default(),
            state: None,
        }
    }
}

impl RepoSettings {
    pub fn settings_dir() -> Result<PathBuf> {
        home_dir()
            .map(|home| home.join(".polrepo"))
            .context("cannot determine home directory; is $HOME set?")
    }

    pub fn settings_file() -> Result<PathBuf> {
        Ok(Self::settings_dir()?.join("settings.json"))
    }

    /// Loads settings from `path`, or from the default settings file.
    ///
    /// A missing default file yields the defaults; an explicitly named file
    /// must exist.
    #[instrument(level = Level::TRACE)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::settings_file() {
                Ok(p) => (p, false),
                Err(e) => {
                    debug!(error = %e, "no settings directory, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings file: {}", path.display()))?;
        let settings: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse settings file: {}", path.display()))?;

        settings
            .loader_config()
            .with_context(|| format!("invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Builds the loader configuration these settings describe.
    pub fn loader_config(&self) -> Result<LoaderConfig> {
        let config = LoaderConfig::with_ignore_patterns(&self.ignore)
            .context("invalid ignore pattern")?;
        Ok(config.with_merge_strategy(self.merge))
    }

    /// Resolves the state file: `--state` beats the `state` setting, which
    /// beats `~/.polrepo/state.json`.
    pub fn state_file(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        match cli_override.or(self.state.as_deref()) {
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(Self::settings_dir()?.join("state.json")),
        }
    }
}
