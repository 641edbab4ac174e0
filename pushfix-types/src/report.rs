use crate::version::VersionBump;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The run report artifact (report.json).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema: String,
    pub tool: ToolInfo,
    pub run: RunInfo,
    pub plan: PlanRef,

    #[serde(default)]
    pub steps: Vec<StepResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionBump>,

    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(tool: ToolInfo, plan: PlanRef, dry_run: bool) -> Self {
        Self {
            schema: crate::schema::PUSHFIX_REPORT_V1.to_string(),
            tool,
            run: RunInfo {
                run_id: Uuid::new_v4(),
                started_at: Some(Utc::now()),
                ended_at: None,
                dry_run,
            },
            plan,
            steps: vec![],
            version: None,
            summary: RunSummary::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub dry_run: bool,
}

/// Reference to the plan a run consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRef {
    pub path: String,
    pub name: String,
}

/// One entry per step action (per target for backup/patch, one for the
/// version bump, commit, and cleanup steps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepKind,
    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Failure classification, present for skipped/failed/no-op outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<FailureClass>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Backup,
    Patch,
    VersionBump,
    Commit,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Applied,
    /// The step ran but had nothing to do (locator matched nowhere).
    NoOp,
    Skipped,
    Failed,
}

/// The failure taxonomy surfaced in reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    TargetMissing,
    NoMatch,
    ParseFallback,
    ExternalCommandFailure,
    IoFailure,
}

/// Per-file change record with integrity digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_before: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256_after: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub targets_total: u64,
    pub patched: u64,
    pub no_match: u64,
    pub skipped: u64,
    pub failed: u64,
}
