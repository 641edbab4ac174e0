//! Configuration file loading for pushfix.
//!
//! Discovers and loads `pushfix.toml` from the repository root and merges it
//! with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use pushfix_backup::BackupLayout;
use pushfix_core::RunOptions;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "pushfix.toml";

/// Top-level configuration from pushfix.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushfixConfig {
    pub backups: BackupsConfig,
    pub git: GitConfig,

    /// Artifact directory; defaults to `<repo_root>/artifacts/pushfix`.
    pub out_dir: Option<Utf8PathBuf>,
}

/// Backups section of the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupsConfig {
    /// Backup root, resolved against the repo root when relative.
    pub root: Utf8PathBuf,
    pub layout: BackupLayout,
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("backups"),
            layout: BackupLayout::Flat,
        }
    }
}

/// Git section of the config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Treat git failures as fatal even when the plan does not say so.
    pub strict: bool,

    /// Never push, regardless of what plans ask for.
    pub no_push: bool,
}

/// Discover the pushfix.toml config file in the repository root.
pub fn discover_config(repo_root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = repo_root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<PushfixConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<PushfixConfig> {
    let config: PushfixConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from repo root, or return default if not found.
pub fn load_or_default(repo_root: &Utf8Path) -> anyhow::Result<PushfixConfig> {
    match discover_config(repo_root) {
        Some(path) => load_config(&path),
        None => Ok(PushfixConfig::default()),
    }
}

/// Combines config file settings with CLI arguments. CLI flags can only
/// tighten behavior (force dry-run, keep the plan, suppress the push,
/// escalate git failures); they never loosen a config-file setting.
#[derive(Debug, Clone)]
pub struct ConfigMerger {
    config: PushfixConfig,
}

impl ConfigMerger {
    pub fn new(config: PushfixConfig) -> Self {
        Self { config }
    }

    pub fn merge_run_args(
        &self,
        dry_run: bool,
        keep_plan: bool,
        no_push: bool,
        strict_git: bool,
    ) -> RunOptions {
        RunOptions {
            dry_run,
            keep_plan,
            no_push: no_push || self.config.git.no_push,
            force_strict_git: strict_git || self.config.git.strict,
            backup_root: self.config.backups.root.clone(),
            backup_layout: self.config.backups.layout,
        }
    }

    pub fn out_dir(&self, repo_root: &Utf8Path, cli_out_dir: Option<Utf8PathBuf>) -> Utf8PathBuf {
        cli_out_dir
            .or_else(|| self.config.out_dir.clone())
            .unwrap_or_else(|| repo_root.join("artifacts").join("pushfix"))
    }
}
