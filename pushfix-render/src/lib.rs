//! Rendering helpers (markdown) for human-readable run artifacts.

use pushfix_types::report::{FailureClass, RunReport, StepKind, StepStatus};

pub fn render_report_md(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str("# pushfix run\n\n");
    out.push_str(&format!("- Plan: `{}` ({})\n", report.plan.name, report.plan.path));
    out.push_str(&format!("- Run id: `{}`\n", report.run.run_id));
    if report.run.dry_run {
        out.push_str("- Mode: dry-run (no files written)\n");
    }
    out.push_str(&format!(
        "- Targets: {} (patched {}, no-match {}, skipped {}, failed {})\n\n",
        report.summary.targets_total,
        report.summary.patched,
        report.summary.no_match,
        report.summary.skipped,
        report.summary.failed,
    ));

    if let Some(bump) = &report.version {
        out.push_str(&format!(
            "- Version: {}{}\n\n",
            bump.record,
            if bump.first_run {
                " (ledger reset, first run)"
            } else if bump.parse_fallback {
                " (code fell back to 1)"
            } else {
                ""
            }
        ));
    }

    out.push_str("## Steps\n\n");
    if report.steps.is_empty() {
        out.push_str("_No steps ran._\n");
        return out;
    }

    for (i, step) in report.steps.iter().enumerate() {
        out.push_str(&format!(
            "### {}. {}: `{}`\n\n",
            i + 1,
            step_label(step.step),
            status_label(step.status)
        ));
        if let Some(class) = step.class {
            out.push_str(&format!("- Class: `{}`\n", class_label(class)));
        }
        if let Some(msg) = &step.message {
            out.push_str(&format!("- {}\n", msg));
        }
        if !step.files.is_empty() {
            out.push_str("\n**Files**\n\n");
            for fc in &step.files {
                let before = fc.sha256_before.as_deref().unwrap_or("-");
                let after = fc.sha256_after.as_deref().unwrap_or("-");
                out.push_str(&format!("- `{}` {} -> {}\n", fc.path, before, after));
                if let Some(backup) = &fc.backup_path {
                    out.push_str(&format!("  - backup: `{}`\n", backup));
                }
            }
        }
        out.push('\n');
    }

    out
}

fn step_label(step: StepKind) -> &'static str {
    match step {
        StepKind::Backup => "backup",
        StepKind::Patch => "patch",
        StepKind::VersionBump => "version bump",
        StepKind::Commit => "commit",
        StepKind::Cleanup => "cleanup",
    }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Applied => "applied",
        StepStatus::NoOp => "no-op",
        StepStatus::Skipped => "skipped",
        StepStatus::Failed => "failed",
    }
}

fn class_label(class: FailureClass) -> &'static str {
    match class {
        FailureClass::TargetMissing => "target missing",
        FailureClass::NoMatch => "no match",
        FailureClass::ParseFallback => "parse fallback",
        FailureClass::ExternalCommandFailure => "external command failure",
        FailureClass::IoFailure => "io failure",
    }
}
