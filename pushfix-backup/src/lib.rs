//! Pre-mutation file snapshots.
//!
//! Before a run mutates anything it copies each target's current bytes under
//! a backup root. Backups are write-once: the tool never reads them back;
//! recovery is a manual copy. Stamp granularity is one second, so two runs
//! starting in the same second collide and the last write wins. Accepted
//! rather than deduplicated.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("create backup directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("copy {source_path} to {dest}: {source}")]
    Copy {
        source_path: String,
        dest: String,
        #[source]
        source: std::io::Error,
    },
}

/// How backups are laid out under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupLayout {
    /// `<root>/<basename>_<YYYYMMDD_HHMMSS>.bak`; every run shares the root.
    #[default]
    Flat,

    /// `<root>/<run stamp>/<relative path>`; one directory per run,
    /// preserving the target's relative path.
    PerRun,
}

/// Record of one snapshot, carried into the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCopy {
    pub source: Utf8PathBuf,
    pub dest: Utf8PathBuf,
    pub created_at: DateTime<Utc>,
}

/// A sink bound to one backup root and one run stamp.
#[derive(Debug, Clone)]
pub struct BackupSink {
    root: Utf8PathBuf,
    layout: BackupLayout,
    stamp: String,
}

impl BackupSink {
    /// The stamp is captured once at construction so every file preserved by
    /// the same run shares it.
    pub fn new(root: Utf8PathBuf, layout: BackupLayout) -> Self {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        Self {
            root,
            layout,
            stamp,
        }
    }

    /// Copy `rel` (resolved against `repo_root`) into the backup tree,
    /// creating directories as needed. The source file is never mutated.
    pub fn preserve(&self, repo_root: &Utf8Path, rel: &Utf8Path) -> Result<BackupCopy, BackupError> {
        let source = repo_root.join(rel);
        let dest = self.dest_for(rel);

        let parent = dest.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|source| BackupError::CreateDir {
            path: parent.to_string(),
            source,
        })?;

        fs::copy(&source, &dest).map_err(|err| BackupError::Copy {
            source_path: source.to_string(),
            dest: dest.to_string(),
            source: err,
        })?;

        debug!(source = %source, dest = %dest, "preserved");

        Ok(BackupCopy {
            source,
            dest,
            created_at: Utc::now(),
        })
    }

    fn dest_for(&self, rel: &Utf8Path) -> Utf8PathBuf {
        match self.layout {
            BackupLayout::Flat => {
                let basename = rel.file_name().unwrap_or(rel.as_str());
                self.root.join(format!("{basename}_{}.bak", self.stamp))
            }
            BackupLayout::PerRun => self.root.join(&self.stamp).join(rel),
        }
    }
}
