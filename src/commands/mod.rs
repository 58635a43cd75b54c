//! Command implementations

pub mod apply;
pub mod destroy;
pub mod diff;
pub mod hash;
pub mod id;
pub mod refresh;
pub mod state;

use crate::Context;
use crate::config::CloudrecConfig;
use crate::paths;
use crate::resource::Registry;
use crate::snapshot::SnapshotRemote;
use anyhow::{Context as AnyhowContext, Result};
use reconcile::{CancelToken, IgnorePolicy, RetryingRemote};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The remote as every command sees it: a snapshot behind the retry layer.
pub type Remote = RetryingRemote<SnapshotRemote>;

impl Context {
    /// Config file from `--config`, or the default location.
    pub fn config_file(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(paths::expand(&path.to_string_lossy())),
            None => paths::config_file(),
        }
    }

    /// State file from `--state`, or the default location.
    pub fn state_file(&self) -> Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(paths::expand(&path.to_string_lossy())),
            None => paths::state_file(),
        }
    }
}

/// Load the config and build the ignore policy it declares.
pub fn load_config(ctx: &Context) -> Result<(CloudrecConfig, IgnorePolicy)> {
    let path = ctx.config_file()?;
    let config = CloudrecConfig::load(&path)?;
    let policy = config
        .ignore_policy()
        .with_context(|| format!("Invalid [ignore_tags] in {}", path.display()))?;
    Ok((config, policy))
}

/// Open a snapshot and wrap it with the configured retry behaviour.
pub fn open_remote(config: &CloudrecConfig, registry: &Registry, snapshot: &Path) -> Result<Remote> {
    let snapshot = paths::expand(&snapshot.to_string_lossy());
    let inner = SnapshotRemote::load(&snapshot, registry)?;
    Ok(RetryingRemote::new(inner, config.retry_config()))
}

/// Cancellation token, with a deadline when a timeout was given.
pub fn cancel_token(timeout: Option<u64>) -> CancelToken {
    match timeout {
        Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
        None => CancelToken::new(),
    }
}

/// Ask the user to confirm
pub fn confirm(prompt: &str) -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(confirmed)
}
