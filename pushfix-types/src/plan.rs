use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// A one-shot patch plan, authored as TOML.
///
/// A plan names the files to patch, how to locate the spans to replace, and
/// which follow-up steps (version bump, commit, cleanup) the run should take.
/// Plans are consumed: a successful run retires the plan file unless told
/// otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPlan {
    #[serde(default = "default_plan_schema")]
    pub schema: String,

    /// Short identifier for this hotfix, used in logs and the run report.
    pub name: String,

    /// Commit message for the git step. When absent, a message is derived
    /// from the version bump (or the plan name if there is no bump).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_message: Option<String>,

    #[serde(default)]
    pub targets: Vec<PatchTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionBumpSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<GitSpec>,

    /// Delete the plan file after a successful run.
    #[serde(default = "default_true")]
    pub cleanup: bool,

    /// What to do when reading or writing a target fails mid-run.
    #[serde(default)]
    pub on_io_error: IoErrorPolicy,
}

fn default_plan_schema() -> String {
    crate::schema::PUSHFIX_PLAN_V1.to_string()
}

fn default_true() -> bool {
    true
}

/// Explicit policy for target I/O failures: abort the whole run, or log and
/// continue with unrelated targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoErrorPolicy {
    #[default]
    Abort,
    Continue,
}

/// One file to mutate.
///
/// Either `ops` rewrite spans in place, or `contents`/`contents_file`
/// replace the whole file (last-run-wins; no merge detection across plans).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchTarget {
    /// Path relative to the repository root.
    pub path: Utf8PathBuf,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ops: Vec<PatchOp>,

    /// Inline replacement for the entire file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,

    /// Replacement for the entire file, read from another file at run start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents_file: Option<Utf8PathBuf>,

    /// Create the target when it is missing (whole-file targets only).
    /// Missing targets are otherwise skipped with a warning.
    #[serde(default)]
    pub create: bool,
}

impl PatchTarget {
    /// True when this target replaces the whole file instead of patching spans.
    pub fn is_whole_file(&self) -> bool {
        self.contents.is_some() || self.contents_file.is_some()
    }
}

/// A single locate-and-replace operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchOp {
    pub locator: Locator,

    /// Replacement text. Regex locators may interpolate `$1`-style capture
    /// groups; literal and span locators insert it verbatim.
    pub replacement: String,
}

/// How to find the span to replace. Matching is purely textual and
/// first-match-wins; none of the kinds understand the grammar of the file
/// they scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// Exact substring match.
    Literal { find: String },

    /// Regex match; capture groups are available to the replacement.
    Regex { pattern: String },

    /// From the first match of `start` up to (excluding) the next match of
    /// `end` after it. Both anchors are regexes. The end anchor can match a
    /// nested occurrence; that is the accepted contract.
    Span { start: String, end: String },
}

/// Version-ledger step configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionBumpSpec {
    /// Build descriptor holding the code/name fields.
    pub descriptor: Utf8PathBuf,

    /// Sentinel marker recording that the ledger has been initialized.
    #[serde(default = "default_sentinel")]
    pub sentinel: Utf8PathBuf,

    /// Override for the version-code field pattern (two capture groups:
    /// prefix, digits). Defaults to the gradle-kts shape.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_pattern: Option<String>,

    /// Override for the version-name field pattern (three capture groups:
    /// prefix, value, closing quote).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
}

fn default_sentinel() -> Utf8PathBuf {
    Utf8PathBuf::from(".version_tracker")
}

/// Git step configuration. The run stages everything, commits, and pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSpec {
    /// Push after committing.
    pub push: bool,

    /// Treat a failing git command as fatal (non-zero exit) instead of a
    /// warning.
    pub strict: bool,
}

impl Default for GitSpec {
    fn default() -> Self {
        Self {
            push: true,
            strict: false,
        }
    }
}
