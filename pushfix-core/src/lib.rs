//! Run orchestration for pushfix plans.
//!
//! A run walks a fixed step sequence, run-to-completion, no retries:
//!
//! `Backup -> Patch -> VersionBump? -> Commit? -> Cleanup?`
//!
//! There is no rollback. A failure after Patch leaves the working tree
//! modified; recovery is manual, from the backups taken up front.

pub mod git;
pub mod pipeline;

pub use git::{GitRunner, SystemGitRunner};
pub use pipeline::{prepare_plan, run_plan, PreparedPlan, RunOptions};
