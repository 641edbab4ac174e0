mod config;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::ConfigMerger;
use fs_err as fs;
use pushfix_backup::BackupSink;
use pushfix_core::{prepare_plan, run_plan, SystemGitRunner};
use pushfix_ledger::{
    load_state, next_version, persist_state, rewrite_descriptor, FieldPatterns,
    DEFAULT_CODE_PATTERN, DEFAULT_NAME_PATTERN,
};
use pushfix_render::render_report_md;
use pushfix_types::plan::PatchPlan;
use pushfix_types::report::{StepKind, StepStatus, ToolInfo};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pushfix",
    version,
    about = "One-shot hotfix runner: patch, bump, back up, push."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a patch plan: backup, patch, version bump, commit, cleanup.
    Run(RunArgs),
    /// Preflight a plan without writing anything: compile locators, report matches.
    Check(CheckArgs),
    /// Bump the version ledger on its own.
    Bump(BumpArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Plan file (TOML).
    plan: Utf8PathBuf,

    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,

    /// Artifact directory (default: <repo_root>/artifacts/pushfix).
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,

    /// Compute everything but write no target, backup, or sentinel, and run
    /// no git command.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Leave the plan file in place after the run.
    #[arg(long, default_value_t = false)]
    keep_plan: bool,

    /// Commit but never push.
    #[arg(long, default_value_t = false)]
    no_push: bool,

    /// Treat git failures as fatal regardless of the plan's setting.
    #[arg(long, default_value_t = false)]
    strict_git: bool,
}

#[derive(Debug, Parser)]
struct CheckArgs {
    /// Plan file (TOML).
    plan: Utf8PathBuf,

    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,

    /// Artifact directory for the patch preview.
    #[arg(long)]
    out_dir: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct BumpArgs {
    /// Repository root (default: current directory).
    #[arg(long, default_value = ".")]
    repo_root: Utf8PathBuf,

    /// Build descriptor holding the version fields.
    #[arg(long)]
    descriptor: Utf8PathBuf,

    /// Sentinel marker recording ledger initialization.
    #[arg(long, default_value = ".version_tracker")]
    sentinel: Utf8PathBuf,

    /// Override for the version-code field pattern.
    #[arg(long)]
    code_pattern: Option<String>,

    /// Override for the version-name field pattern.
    #[arg(long)]
    name_pattern: Option<String>,

    /// Write the bumped descriptor (default: print the next version only).
    #[arg(long, default_value_t = false)]
    apply: bool,
}

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        error!("{:?}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Check(args) => cmd_check(args),
        Command::Bump(args) => cmd_bump(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let repo_root = args.repo_root;
    let plan = load_plan(&args.plan)?;

    let file_config = config::load_or_default(&repo_root).context("load pushfix.toml config")?;
    let merger = ConfigMerger::new(file_config);
    let out_dir = merger.out_dir(&repo_root, args.out_dir);
    let opts = merger.merge_run_args(args.dry_run, args.keep_plan, args.no_push, args.strict_git);

    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir))?;

    let (report, patch) = run_plan(
        &repo_root,
        &args.plan,
        &plan,
        &SystemGitRunner,
        tool_info(),
        &opts,
    )
    .with_context(|| format!("run plan {}", plan.name))?;

    write_json(&out_dir.join("report.json"), &report)?;
    fs::write(out_dir.join("report.md"), render_report_md(&report))?;
    fs::write(out_dir.join("patch.diff"), &patch)?;

    if report.summary.failed > 0 {
        warn!(
            failed = report.summary.failed,
            "run finished with failed steps, see the report"
        );
    }
    info!("wrote run artifacts to {}", out_dir);
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let repo_root = args.repo_root;
    let plan = load_plan(&args.plan)?;

    let prepared = prepare_plan(&repo_root, &plan).context("preflight")?;
    info!(
        targets = prepared.targets.len(),
        "all locators compiled, previewing matches"
    );

    let file_config = config::load_or_default(&repo_root).context("load pushfix.toml config")?;
    let merger = ConfigMerger::new(file_config);
    let out_dir = merger.out_dir(&repo_root, args.out_dir);

    let opts = merger.merge_run_args(true, true, true, false);
    let (report, patch) = run_plan(
        &repo_root,
        &args.plan,
        &plan,
        &SystemGitRunner,
        tool_info(),
        &opts,
    )
    .with_context(|| format!("preview plan {}", plan.name))?;

    println!("Plan `{}`:\n", plan.name);
    for step in report.steps.iter().filter(|s| s.step == StepKind::Patch) {
        let path = step
            .files
            .first()
            .map(|f| f.path.as_str())
            .unwrap_or("-");
        println!(
            "  {:<8} {:<48} {}",
            status_label(step.status),
            path,
            step.message.as_deref().unwrap_or("")
        );
    }
    if let Some(bump) = &report.version {
        println!("\n  version  would become {}", bump.record);
    }

    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir))?;
    fs::write(out_dir.join("patch.diff"), &patch)?;
    println!("\nPreview written to {}/patch.diff", out_dir);

    Ok(())
}

fn cmd_bump(args: BumpArgs) -> anyhow::Result<()> {
    let repo_root = args.repo_root;
    let descriptor_abs = resolve(&repo_root, &args.descriptor);
    let sentinel_abs = resolve(&repo_root, &args.sentinel);

    let patterns = FieldPatterns::new(
        args.code_pattern.as_deref().unwrap_or(DEFAULT_CODE_PATTERN),
        args.name_pattern.as_deref().unwrap_or(DEFAULT_NAME_PATTERN),
    )?;

    let text = fs::read_to_string(&descriptor_abs)
        .with_context(|| format!("read descriptor {}", descriptor_abs))?;
    let state = load_state(&sentinel_abs);
    let bump = next_version(&text, state, &patterns);

    if !args.apply {
        println!(
            "next version: {}{}",
            bump.record,
            if bump.first_run {
                " (first run: ledger resets)"
            } else {
                ""
            }
        );
        return Ok(());
    }

    let file_config = config::load_or_default(&repo_root).context("load pushfix.toml config")?;
    let sink = BackupSink::new(
        resolve(&repo_root, &file_config.backups.root),
        file_config.backups.layout,
    );
    sink.preserve(&repo_root, &args.descriptor)
        .with_context(|| format!("backup {}", args.descriptor))?;

    let rewritten = rewrite_descriptor(&text, &bump.record, &patterns);
    fs::write(&descriptor_abs, rewritten)
        .with_context(|| format!("write descriptor {}", descriptor_abs))?;
    if bump.first_run {
        persist_state(&sentinel_abs, Utc::now()).context("create sentinel")?;
    }

    info!(version = %bump.record, first_run = bump.first_run, "version bumped");
    Ok(())
}

fn load_plan(path: &Utf8Path) -> anyhow::Result<PatchPlan> {
    let contents = fs::read_to_string(path).with_context(|| format!("read plan {}", path))?;
    let plan: PatchPlan =
        toml::from_str(&contents).with_context(|| format!("parse plan {}", path))?;
    if plan.schema != pushfix_types::schema::PUSHFIX_PLAN_V1 {
        warn!(schema = %plan.schema, "unrecognized plan schema, continuing anyway");
    }
    Ok(plan)
}

fn resolve(repo_root: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        repo_root.join(path)
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

fn write_json<T: serde::Serialize>(path: &Utf8Path, v: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(v).context("serialize json")?;
    fs::write(path, s).with_context(|| format!("write {}", path))?;
    Ok(())
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "pushfix".to_string(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    }
}
