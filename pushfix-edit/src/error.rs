//! Error types for pushfix-edit.
//!
//! The engine distinguishes exactly one fatal condition (a locator pattern
//! that does not compile) from the non-fatal "matched nowhere" outcome,
//! which is reported as [`crate::ReplaceOutcome::NoMatch`] rather than an
//! error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    /// A locator pattern failed to compile. Fatal for the whole run, before
    /// any file is touched.
    #[error("invalid locator pattern `{pattern}`: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
