//! End-to-end pipeline runs against throwaway repos.

use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use pushfix_core::{run_plan, GitRunner, RunOptions};
use pushfix_types::plan::{
    GitSpec, IoErrorPolicy, Locator, PatchOp, PatchPlan, PatchTarget, VersionBumpSpec,
};
use pushfix_types::report::{FailureClass, StepKind, StepStatus, ToolInfo};
use std::cell::RefCell;
use std::fs;
use tempfile::TempDir;

const DESCRIPTOR: &str = "versionCode = 5\nversionName = \"2.3\"\n";
const SERVICE: &str = "class TimerService {\n    fun stop() { stopSelf() }\n}\n";

struct RecordingGit {
    calls: RefCell<Vec<String>>,
}

impl RecordingGit {
    fn new() -> Self {
        Self {
            calls: RefCell::new(vec![]),
        }
    }
}

impl GitRunner for RecordingGit {
    fn stage_all(&self, _repo_root: &Utf8Path) -> anyhow::Result<()> {
        self.calls.borrow_mut().push("add".to_string());
        Ok(())
    }

    fn commit(&self, _repo_root: &Utf8Path, message: &str) -> anyhow::Result<()> {
        self.calls.borrow_mut().push(format!("commit:{message}"));
        Ok(())
    }

    fn push(&self, _repo_root: &Utf8Path) -> anyhow::Result<()> {
        self.calls.borrow_mut().push("push".to_string());
        Ok(())
    }
}

struct FailingGit;

impl GitRunner for FailingGit {
    fn stage_all(&self, _repo_root: &Utf8Path) -> anyhow::Result<()> {
        anyhow::bail!("simulated git failure")
    }

    fn commit(&self, _repo_root: &Utf8Path, _message: &str) -> anyhow::Result<()> {
        anyhow::bail!("unreachable")
    }

    fn push(&self, _repo_root: &Utf8Path) -> anyhow::Result<()> {
        anyhow::bail!("unreachable")
    }
}

fn tool() -> ToolInfo {
    ToolInfo {
        name: "pushfix".to_string(),
        version: Some("0.0.0".to_string()),
    }
}

fn setup_repo() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf8 path");

    fs::create_dir_all(root.join("app/src")).expect("mkdir");
    fs::write(root.join("app/build.gradle.kts"), DESCRIPTOR).expect("write descriptor");
    fs::write(root.join("app/src/TimerService.kt"), SERVICE).expect("write service");
    fs::write(root.join("hotfix.toml"), "# consumed plan\n").expect("write plan file");

    (temp, root)
}

fn service_patch_plan() -> PatchPlan {
    PatchPlan {
        schema: pushfix_types::schema::PUSHFIX_PLAN_V1.to_string(),
        name: "fix-timer-stop".to_string(),
        commit_message: None,
        targets: vec![PatchTarget {
            path: Utf8PathBuf::from("app/src/TimerService.kt"),
            ops: vec![PatchOp {
                locator: Locator::Literal {
                    find: "stopSelf()".to_string(),
                },
                replacement: "stopForeground(true); stopSelf()".to_string(),
            }],
            contents: None,
            contents_file: None,
            create: false,
        }],
        version: Some(VersionBumpSpec {
            descriptor: Utf8PathBuf::from("app/build.gradle.kts"),
            sentinel: Utf8PathBuf::from(".version_tracker"),
            code_pattern: None,
            name_pattern: None,
        }),
        git: Some(GitSpec {
            push: true,
            strict: false,
        }),
        cleanup: true,
        on_io_error: IoErrorPolicy::Abort,
    }
}

#[test]
fn full_run_patches_bumps_commits_and_retires_the_plan() {
    let (_temp, root) = setup_repo();
    fs::write(root.join(".version_tracker"), "Initialized\n").expect("seed sentinel");

    let plan = service_patch_plan();
    let git = RecordingGit::new();
    let (report, patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &git,
        tool(),
        &RunOptions::default(),
    )
    .expect("run succeeds");

    let service = fs::read_to_string(root.join("app/src/TimerService.kt")).expect("read");
    assert!(service.contains("stopForeground(true); stopSelf()"));

    let descriptor = fs::read_to_string(root.join("app/build.gradle.kts")).expect("read");
    assert_eq!(descriptor, "versionCode = 6\nversionName = \"2.4\"\n");

    assert_eq!(
        *git.calls.borrow(),
        vec![
            "add".to_string(),
            "commit:Bump version code: 6".to_string(),
            "push".to_string(),
        ]
    );

    assert!(!root.join("hotfix.toml").exists(), "plan file retired");
    assert!(!patch.is_empty());
    assert_eq!(report.summary.patched, 1);
    assert_eq!(report.summary.failed, 0);

    // Backups landed before mutation and hold the original bytes.
    let backup_step = report
        .steps
        .iter()
        .find(|s| s.step == StepKind::Backup)
        .expect("backup step");
    assert_eq!(backup_step.status, StepStatus::Applied);
    let service_backup = backup_step
        .files
        .iter()
        .find(|f| f.path.ends_with("TimerService.kt"))
        .and_then(|f| f.backup_path.as_deref())
        .expect("service backup recorded");
    assert_eq!(
        fs::read_to_string(service_backup).expect("read backup"),
        SERVICE
    );
}

#[test]
fn dry_run_computes_everything_and_writes_nothing() {
    let (_temp, root) = setup_repo();

    let plan = service_patch_plan();
    let git = RecordingGit::new();
    let opts = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };
    let (report, patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &git,
        tool(),
        &opts,
    )
    .expect("dry run succeeds");

    assert_eq!(
        fs::read_to_string(root.join("app/src/TimerService.kt")).expect("read"),
        SERVICE
    );
    assert_eq!(
        fs::read_to_string(root.join("app/build.gradle.kts")).expect("read"),
        DESCRIPTOR
    );
    assert!(root.join("hotfix.toml").exists());
    assert!(!root.join(".version_tracker").exists(), "no sentinel in dry-run");
    assert!(!root.join("backups").exists(), "no backups in dry-run");
    assert!(git.calls.borrow().is_empty());

    // The would-be changes are still fully computed.
    assert!(patch.contains("stopForeground(true); stopSelf()"));
    let bump = report.version.expect("version computed");
    assert!(bump.first_run);
    assert_eq!(bump.record.code, 1);
    assert_eq!(bump.record.name, "1.0");
}

#[test]
fn first_run_resets_the_ledger_and_creates_the_sentinel() {
    let (_temp, root) = setup_repo();

    let mut plan = service_patch_plan();
    plan.git = None;
    let (report, _patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .expect("run succeeds");

    let descriptor = fs::read_to_string(root.join("app/build.gradle.kts")).expect("read");
    assert_eq!(descriptor, "versionCode = 1\nversionName = \"1.0\"\n");
    assert!(root.join(".version_tracker").exists());
    assert!(report.version.expect("bump").first_run);
}

#[test]
fn missing_target_is_skipped_and_the_run_continues() {
    let (_temp, root) = setup_repo();
    fs::write(root.join(".version_tracker"), "Initialized\n").expect("seed sentinel");

    let mut plan = service_patch_plan();
    plan.targets.insert(
        0,
        PatchTarget {
            path: Utf8PathBuf::from("app/src/Gone.kt"),
            ops: vec![PatchOp {
                locator: Locator::Literal {
                    find: "x".to_string(),
                },
                replacement: "y".to_string(),
            }],
            contents: None,
            contents_file: None,
            create: false,
        },
    );
    plan.git = None;

    let (report, _patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .expect("run succeeds");

    assert_eq!(report.summary.skipped, 1);
    assert_eq!(report.summary.patched, 1);
    let skipped = report
        .steps
        .iter()
        .find(|s| s.status == StepStatus::Skipped && s.step == StepKind::Patch)
        .expect("skipped step");
    assert_eq!(skipped.class, Some(FailureClass::TargetMissing));
}

#[test]
fn no_match_leaves_the_file_untouched() {
    let (_temp, root) = setup_repo();
    fs::write(root.join(".version_tracker"), "Initialized\n").expect("seed sentinel");

    let mut plan = service_patch_plan();
    plan.targets[0].ops[0].locator = Locator::Literal {
        find: "not in this file".to_string(),
    };
    plan.git = None;
    plan.version = None;

    let (report, patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .expect("run succeeds");

    assert_eq!(
        fs::read_to_string(root.join("app/src/TimerService.kt")).expect("read"),
        SERVICE
    );
    assert_eq!(report.summary.no_match, 1);
    assert!(patch.is_empty(), "nothing changed, nothing to diff");
    let noop = report
        .steps
        .iter()
        .find(|s| s.step == StepKind::Patch)
        .expect("patch step");
    assert_eq!(noop.status, StepStatus::NoOp);
    assert_eq!(noop.class, Some(FailureClass::NoMatch));
}

#[test]
fn strict_git_failure_aborts_with_an_error() {
    let (_temp, root) = setup_repo();

    let mut plan = service_patch_plan();
    plan.git = Some(GitSpec {
        push: true,
        strict: true,
    });

    let err = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &FailingGit,
        tool(),
        &RunOptions::default(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("git step failed"));
    // Aborted before cleanup: the plan file survives for a retry.
    assert!(root.join("hotfix.toml").exists());
}

#[test]
fn lenient_git_failure_is_recorded_and_the_run_finishes() {
    let (_temp, root) = setup_repo();

    let plan = service_patch_plan();
    let (report, _patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &FailingGit,
        tool(),
        &RunOptions::default(),
    )
    .expect("run succeeds despite git");

    let commit = report
        .steps
        .iter()
        .find(|s| s.step == StepKind::Commit)
        .expect("commit step");
    assert_eq!(commit.status, StepStatus::Failed);
    assert_eq!(commit.class, Some(FailureClass::ExternalCommandFailure));
    // Cleanup still ran.
    assert!(!root.join("hotfix.toml").exists());
}

#[test]
fn malformed_locator_aborts_before_any_file_is_touched() {
    let (_temp, root) = setup_repo();

    let mut plan = service_patch_plan();
    plan.targets[0].ops[0].locator = Locator::Regex {
        pattern: "(unclosed".to_string(),
    };

    let err = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("compile locators"));
    assert_eq!(
        fs::read_to_string(root.join("app/src/TimerService.kt")).expect("read"),
        SERVICE
    );
    assert!(!root.join("backups").exists(), "no backups for an aborted preflight");
    assert!(root.join("hotfix.toml").exists());
}

#[test]
fn io_failure_honors_the_continue_policy() {
    let (_temp, root) = setup_repo();
    // A directory where a file is expected forces a read failure.
    fs::create_dir_all(root.join("app/src/Broken.kt")).expect("mkdir");

    let mut plan = service_patch_plan();
    plan.version = None;
    plan.git = None;
    plan.on_io_error = IoErrorPolicy::Continue;
    plan.targets.insert(
        0,
        PatchTarget {
            path: Utf8PathBuf::from("app/src/Broken.kt"),
            ops: vec![PatchOp {
                locator: Locator::Literal {
                    find: "x".to_string(),
                },
                replacement: "y".to_string(),
            }],
            contents: None,
            contents_file: None,
            create: false,
        },
    );

    let (report, _patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .expect("run continues past the broken target");

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.patched, 1, "the healthy target still ran");
    let failed = report
        .steps
        .iter()
        .find(|s| s.status == StepStatus::Failed)
        .expect("failed step");
    assert_eq!(failed.class, Some(FailureClass::IoFailure));
}

#[test]
fn io_failure_aborts_under_the_default_policy() {
    let (_temp, root) = setup_repo();
    fs::create_dir_all(root.join("app/src/Broken.kt")).expect("mkdir");

    let mut plan = service_patch_plan();
    plan.version = None;
    plan.git = None;
    plan.targets[0].path = Utf8PathBuf::from("app/src/Broken.kt");

    let err = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("read target"));
}

#[test]
fn whole_file_target_with_create_writes_a_new_file() {
    let (_temp, root) = setup_repo();

    let mut plan = service_patch_plan();
    plan.version = None;
    plan.git = None;
    plan.targets = vec![PatchTarget {
        path: Utf8PathBuf::from("app/src/Restored.kt"),
        ops: vec![],
        contents: Some("package com.example\n".to_string()),
        contents_file: None,
        create: true,
    }];

    let (report, _patch) = run_plan(
        &root,
        &root.join("hotfix.toml"),
        &plan,
        &RecordingGit::new(),
        tool(),
        &RunOptions::default(),
    )
    .expect("run succeeds");

    assert_eq!(
        fs::read_to_string(root.join("app/src/Restored.kt")).expect("read"),
        "package com.example\n"
    );
    assert_eq!(report.summary.patched, 1);
}
