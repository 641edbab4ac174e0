//! Shared DTOs (schemas-as-code) for the pushfix workspace.
//!
//! # Design constraints
//! - Plan types are deserialized from hand-authored TOML; be tolerant of
//!   absent optional fields.
//! - Report types are serialized to disk as artifacts. Prefer adding optional
//!   fields over changing semantics.

pub mod plan;
pub mod report;
pub mod version;

/// Schema identifiers.
pub mod schema {
    pub const PUSHFIX_PLAN_V1: &str = "pushfix.plan.v1";
    pub const PUSHFIX_REPORT_V1: &str = "pushfix.report.v1";
}
