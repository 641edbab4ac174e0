//! Git collaborator: stage-all, commit, push through the system git binary.
//!
//! Commands are sequential and unbatched; exit status is the only signal
//! checked. Whether a failure aborts the run is the pipeline's policy, not
//! this module's.

use anyhow::Context;
use camino::Utf8Path;
use std::process::Command;
use tracing::debug;

/// Seam for the three git operations a run needs.
pub trait GitRunner {
    fn stage_all(&self, repo_root: &Utf8Path) -> anyhow::Result<()>;
    fn commit(&self, repo_root: &Utf8Path, message: &str) -> anyhow::Result<()>;
    fn push(&self, repo_root: &Utf8Path) -> anyhow::Result<()>;
}

/// Shells out to `git` on PATH.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemGitRunner;

impl GitRunner for SystemGitRunner {
    fn stage_all(&self, repo_root: &Utf8Path) -> anyhow::Result<()> {
        run_git(repo_root, &["add", "."])
    }

    fn commit(&self, repo_root: &Utf8Path, message: &str) -> anyhow::Result<()> {
        run_git(repo_root, &["commit", "-m", message])
    }

    fn push(&self, repo_root: &Utf8Path) -> anyhow::Result<()> {
        run_git(repo_root, &["push"])
    }
}

fn run_git(repo_root: &Utf8Path, args: &[&str]) -> anyhow::Result<()> {
    debug!(?args, "running git");
    let status = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .status()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;

    if !status.success() {
        anyhow::bail!("git {} exited with {}", args.join(" "), status);
    }
    Ok(())
}
