//! The pipeline itself: prepare, then run the fixed step sequence.

use crate::git::GitRunner;
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use diffy::PatchFormatter;
use fs_err as fs;
use pushfix_backup::{BackupLayout, BackupSink};
use pushfix_edit::{apply_ops, compile_ops, CompiledOp};
use pushfix_ledger::{
    default_commit_message, load_state, next_version, persist_state, rewrite_descriptor,
    FieldPatterns,
};
use pushfix_types::plan::{IoErrorPolicy, PatchPlan};
use pushfix_types::report::{
    FailureClass, FileChange, PlanRef, RunReport, StepKind, StepResult, StepStatus, ToolInfo,
};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Options resolved by the caller (CLI flags merged over config).
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Compute everything in memory; write no target, backup, sentinel, and
    /// run no git command.
    pub dry_run: bool,

    /// Leave the plan file in place even when the plan asks for cleanup.
    pub keep_plan: bool,

    /// Suppress the push even when the plan's git step asks for it.
    pub no_push: bool,

    /// Escalate git failures to fatal regardless of the plan's setting.
    pub force_strict_git: bool,

    /// Backup root, resolved against the repo root when relative.
    pub backup_root: Utf8PathBuf,

    pub backup_layout: BackupLayout,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            keep_plan: false,
            no_push: false,
            force_strict_git: false,
            backup_root: Utf8PathBuf::from("backups"),
            backup_layout: BackupLayout::Flat,
        }
    }
}

/// What a target does once its inputs are validated.
#[derive(Debug, Clone)]
pub enum TargetAction {
    /// Locate-and-replace ops, in declared order.
    Ops(Vec<CompiledOp>),
    /// Whole-file overwrite (last-run-wins).
    Overwrite(String),
}

#[derive(Debug, Clone)]
pub struct PreparedTarget {
    pub path: Utf8PathBuf,
    pub action: TargetAction,
    pub create: bool,
}

/// A plan with every pattern compiled and every payload loaded.
#[derive(Debug, Clone)]
pub struct PreparedPlan {
    pub targets: Vec<PreparedTarget>,
    pub field_patterns: Option<FieldPatterns>,
}

/// Validate a plan's patterns and load whole-file payloads, before anything
/// is mutated. A malformed locator or version-field pattern fails here and
/// leaves the tree untouched.
pub fn prepare_plan(repo_root: &Utf8Path, plan: &PatchPlan) -> anyhow::Result<PreparedPlan> {
    let mut targets = Vec::with_capacity(plan.targets.len());

    for target in &plan.targets {
        let action = if let Some(contents) = &target.contents {
            TargetAction::Overwrite(contents.clone())
        } else if let Some(contents_file) = &target.contents_file {
            let abs = abs_path(repo_root, contents_file);
            let payload =
                fs::read_to_string(&abs).with_context(|| format!("read payload {abs}"))?;
            TargetAction::Overwrite(payload)
        } else {
            let ops = compile_ops(&target.ops)
                .with_context(|| format!("compile locators for {}", target.path))?;
            TargetAction::Ops(ops)
        };

        targets.push(PreparedTarget {
            path: target.path.clone(),
            action,
            create: target.create,
        });
    }

    let field_patterns = match &plan.version {
        Some(spec) => Some(
            FieldPatterns::new(
                spec.code_pattern
                    .as_deref()
                    .unwrap_or(pushfix_ledger::DEFAULT_CODE_PATTERN),
                spec.name_pattern
                    .as_deref()
                    .unwrap_or(pushfix_ledger::DEFAULT_NAME_PATTERN),
            )
            .context("compile version field patterns")?,
        ),
        None => None,
    };

    Ok(PreparedPlan {
        targets,
        field_patterns,
    })
}

/// Run a plan to completion. Returns the run report and a unified diff of
/// everything the run changed (or would change, under dry-run).
pub fn run_plan(
    repo_root: &Utf8Path,
    plan_path: &Utf8Path,
    plan: &PatchPlan,
    git: &dyn GitRunner,
    tool: ToolInfo,
    opts: &RunOptions,
) -> anyhow::Result<(RunReport, String)> {
    let prepared = prepare_plan(repo_root, plan)?;

    let mut report = RunReport::new(
        tool,
        PlanRef {
            path: plan_path.to_string(),
            name: plan.name.clone(),
        },
        opts.dry_run,
    );
    report.summary.targets_total = plan.targets.len() as u64;

    let mut before: BTreeMap<Utf8PathBuf, String> = BTreeMap::new();
    let mut after: BTreeMap<Utf8PathBuf, String> = BTreeMap::new();

    // Backup: snapshot every existing target (and the descriptor) before any
    // mutation. A failing backup aborts the run; without the snapshot there
    // is no manual recovery path.
    let mut backup_paths: BTreeMap<Utf8PathBuf, Utf8PathBuf> = BTreeMap::new();
    if opts.dry_run {
        report.steps.push(StepResult {
            step: StepKind::Backup,
            status: StepStatus::Skipped,
            message: Some("dry-run".to_string()),
            class: None,
            files: vec![],
        });
    } else {
        let sink = BackupSink::new(
            abs_path(repo_root, &opts.backup_root),
            opts.backup_layout,
        );
        let mut files = vec![];

        let mut to_preserve: Vec<Utf8PathBuf> =
            prepared.targets.iter().map(|t| t.path.clone()).collect();
        if let Some(spec) = &plan.version {
            to_preserve.push(spec.descriptor.clone());
        }

        for rel in to_preserve {
            // Only regular files are preserved; missing or non-file targets
            // surface in the patch step instead.
            if !abs_path(repo_root, &rel).is_file() {
                continue;
            }
            let copy = sink
                .preserve(repo_root, &rel)
                .with_context(|| format!("backup {rel}"))?;
            files.push(FileChange {
                path: rel.to_string(),
                sha256_before: None,
                sha256_after: None,
                backup_path: Some(copy.dest.to_string()),
            });
            backup_paths.insert(rel, copy.dest);
        }

        report.steps.push(StepResult {
            step: StepKind::Backup,
            status: StepStatus::Applied,
            message: Some(format!("{} file(s) preserved", files.len())),
            class: None,
            files,
        });
    }

    // Patch: each target independently, in plan order.
    for target in &prepared.targets {
        let abs = abs_path(repo_root, &target.path);
        let exists = abs.exists();

        let creating = !exists && target.create && matches!(target.action, TargetAction::Overwrite(_));
        if !exists && !creating {
            warn!(path = %target.path, "target missing, skipping");
            report.steps.push(StepResult {
                step: StepKind::Patch,
                status: StepStatus::Skipped,
                message: Some(format!("target missing: {}", target.path)),
                class: Some(FailureClass::TargetMissing),
                files: vec![],
            });
            report.summary.skipped += 1;
            continue;
        }

        let old = if exists {
            match fs::read_to_string(&abs) {
                Ok(contents) => contents,
                Err(err) => {
                    if plan.on_io_error == IoErrorPolicy::Abort {
                        return Err(anyhow::Error::new(err)
                            .context(format!("read target {}", target.path)));
                    }
                    warn!(path = %target.path, %err, "read failed, continuing per policy");
                    report.steps.push(StepResult {
                        step: StepKind::Patch,
                        status: StepStatus::Failed,
                        message: Some(format!("read failed: {err}")),
                        class: Some(FailureClass::IoFailure),
                        files: vec![],
                    });
                    report.summary.failed += 1;
                    continue;
                }
            }
        } else {
            String::new()
        };

        let (new, status, class, message) = match &target.action {
            TargetAction::Overwrite(contents) => {
                if *contents == old {
                    (old.clone(), StepStatus::NoOp, None, "contents already in place".to_string())
                } else if creating {
                    (contents.clone(), StepStatus::Applied, None, "file created".to_string())
                } else {
                    (contents.clone(), StepStatus::Applied, None, "file overwritten".to_string())
                }
            }
            TargetAction::Ops(ops) => {
                let (new, outcomes) = apply_ops(&old, ops);
                let matched = outcomes.iter().filter(|o| o.matched).count();
                if matched == 0 {
                    (
                        new,
                        StepStatus::NoOp,
                        Some(FailureClass::NoMatch),
                        format!("0/{} op(s) matched", ops.len()),
                    )
                } else {
                    (
                        new,
                        StepStatus::Applied,
                        None,
                        format!("{matched}/{} op(s) matched", ops.len()),
                    )
                }
            }
        };

        let change = FileChange {
            path: target.path.to_string(),
            sha256_before: exists.then(|| sha256_hex(old.as_bytes())),
            sha256_after: Some(sha256_hex(new.as_bytes())),
            backup_path: backup_paths.get(&target.path).map(|p| p.to_string()),
        };

        if new != old && !opts.dry_run {
            if creating {
                if let Some(parent) = abs.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create parent dirs for {}", target.path))?;
                }
            }
            if let Err(err) = fs::write(&abs, &new) {
                if plan.on_io_error == IoErrorPolicy::Abort {
                    return Err(
                        anyhow::Error::new(err).context(format!("write target {}", target.path))
                    );
                }
                warn!(path = %target.path, %err, "write failed, continuing per policy");
                report.steps.push(StepResult {
                    step: StepKind::Patch,
                    status: StepStatus::Failed,
                    message: Some(format!("write failed: {err}")),
                    class: Some(FailureClass::IoFailure),
                    files: vec![change],
                });
                report.summary.failed += 1;
                continue;
            }
        }

        match status {
            StepStatus::Applied => report.summary.patched += 1,
            StepStatus::NoOp => report.summary.no_match += 1,
            _ => {}
        }

        before.insert(target.path.clone(), old);
        after.insert(target.path.clone(), new);

        report.steps.push(StepResult {
            step: StepKind::Patch,
            status,
            message: Some(message),
            class,
            files: vec![change],
        });
    }

    // Version bump.
    if let Some(spec) = &plan.version {
        let patterns = prepared
            .field_patterns
            .as_ref()
            .expect("prepared alongside the version spec");
        let descriptor_abs = abs_path(repo_root, &spec.descriptor);

        if !descriptor_abs.exists() {
            warn!(path = %spec.descriptor, "descriptor missing, skipping version bump");
            report.steps.push(StepResult {
                step: StepKind::VersionBump,
                status: StepStatus::Skipped,
                message: Some(format!("descriptor missing: {}", spec.descriptor)),
                class: Some(FailureClass::TargetMissing),
                files: vec![],
            });
        } else {
            // The descriptor may itself have been a patch target; bump the
            // patched content, not what is on disk under dry-run.
            let text = match after.get(&spec.descriptor) {
                Some(contents) => contents.clone(),
                None => fs::read_to_string(&descriptor_abs)
                    .with_context(|| format!("read descriptor {}", spec.descriptor))?,
            };

            let sentinel_abs = abs_path(repo_root, &spec.sentinel);
            let state = load_state(&sentinel_abs);
            let bump = next_version(&text, state, patterns);
            let rewritten = rewrite_descriptor(&text, &bump.record, patterns);

            if !opts.dry_run {
                fs::write(&descriptor_abs, &rewritten)
                    .with_context(|| format!("write descriptor {}", spec.descriptor))?;
                if bump.first_run {
                    let started_at = report.run.started_at.unwrap_or_else(Utc::now);
                    persist_state(&sentinel_abs, started_at).context("create sentinel")?;
                }
            }

            info!(version = %bump.record, first_run = bump.first_run, "version bumped");

            before
                .entry(spec.descriptor.clone())
                .or_insert_with(|| text.clone());
            after.insert(spec.descriptor.clone(), rewritten.clone());

            report.steps.push(StepResult {
                step: StepKind::VersionBump,
                status: StepStatus::Applied,
                message: Some(format!("next version {}", bump.record)),
                class: bump.parse_fallback.then_some(FailureClass::ParseFallback),
                files: vec![FileChange {
                    path: spec.descriptor.to_string(),
                    sha256_before: Some(sha256_hex(text.as_bytes())),
                    sha256_after: Some(sha256_hex(rewritten.as_bytes())),
                    backup_path: backup_paths.get(&spec.descriptor).map(|p| p.to_string()),
                }],
            });
            report.version = Some(bump);
        }
    }

    // Commit and push.
    if let Some(git_spec) = &plan.git {
        if opts.dry_run {
            report.steps.push(StepResult {
                step: StepKind::Commit,
                status: StepStatus::Skipped,
                message: Some("dry-run".to_string()),
                class: None,
                files: vec![],
            });
        } else {
            let message = plan
                .commit_message
                .clone()
                .or_else(|| report.version.as_ref().map(default_commit_message))
                .unwrap_or_else(|| plan.name.clone());
            let strict = git_spec.strict || opts.force_strict_git;
            let push = git_spec.push && !opts.no_push;

            let outcome = commit_and_push(git, repo_root, &message, push);
            match outcome {
                Ok(()) => {
                    info!(%message, push, "git step completed");
                    report.steps.push(StepResult {
                        step: StepKind::Commit,
                        status: StepStatus::Applied,
                        message: Some(message),
                        class: None,
                        files: vec![],
                    });
                }
                Err(err) if strict => {
                    return Err(err.context("git step failed (strict)"));
                }
                Err(err) => {
                    warn!(%err, "git step failed, continuing");
                    report.steps.push(StepResult {
                        step: StepKind::Commit,
                        status: StepStatus::Failed,
                        message: Some(format!("{err:#}")),
                        class: Some(FailureClass::ExternalCommandFailure),
                        files: vec![],
                    });
                }
            }
        }
    }

    // Cleanup: retire the consumed plan file.
    if plan.cleanup && !opts.keep_plan {
        if opts.dry_run {
            report.steps.push(StepResult {
                step: StepKind::Cleanup,
                status: StepStatus::Skipped,
                message: Some("dry-run".to_string()),
                class: None,
                files: vec![],
            });
        } else {
            match fs::remove_file(plan_path) {
                Ok(()) => {
                    info!(path = %plan_path, "plan file retired");
                    report.steps.push(StepResult {
                        step: StepKind::Cleanup,
                        status: StepStatus::Applied,
                        message: Some(format!("removed {plan_path}")),
                        class: None,
                        files: vec![],
                    });
                }
                Err(err) => {
                    warn!(%err, "could not remove plan file");
                    report.steps.push(StepResult {
                        step: StepKind::Cleanup,
                        status: StepStatus::Failed,
                        message: Some(format!("remove failed: {err}")),
                        class: Some(FailureClass::IoFailure),
                        files: vec![],
                    });
                }
            }
        }
    }

    let patch = render_patch(&before, &after);
    report.run.ended_at = Some(Utc::now());
    Ok((report, patch))
}

fn commit_and_push(
    git: &dyn GitRunner,
    repo_root: &Utf8Path,
    message: &str,
    push: bool,
) -> anyhow::Result<()> {
    git.stage_all(repo_root)?;
    git.commit(repo_root, message)?;
    if push {
        git.push(repo_root)?;
    }
    Ok(())
}

fn abs_path(repo_root: &Utf8Path, rel: &Utf8Path) -> Utf8PathBuf {
    if rel.is_absolute() {
        rel.to_path_buf()
    } else {
        repo_root.join(rel)
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn render_patch(
    before: &BTreeMap<Utf8PathBuf, String>,
    after: &BTreeMap<Utf8PathBuf, String>,
) -> String {
    let mut out = String::new();
    let formatter = PatchFormatter::new();

    for (path, old) in before {
        let new = after.get(path).unwrap_or(old);
        if old == new {
            continue;
        }

        out.push_str(&format!("diff --git a/{0} b/{0}\n", path));
        out.push_str(&format!("--- a/{0}\n+++ b/{0}\n", path));

        let patch = diffy::create_patch(old, new);
        out.push_str(&formatter.fmt_patch(&patch).to_string());
        if !out.ends_with('\n') {
            out.push('\n');
        }
    }

    out
}
