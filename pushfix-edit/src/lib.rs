//! Textual locate-and-replace engine for pushfix plans.
//!
//! Responsibilities:
//! - Compile plan locators up front, so a malformed pattern aborts the run
//!   before any file is touched.
//! - Replace the first (leftmost) matching region of a file's content.
//! - Apply a target's ops in declared order, each over the output of the
//!   previous.
//!
//! Matching is purely textual. There is no awareness of nested braces,
//! quoted strings, or comments; a span's end anchor can match a nested
//! occurrence of the marker. That is the contract of this engine, not a bug
//! to fix. Anything smarter belongs in a real parser, which this is
//! deliberately not.

mod error;

pub use error::EditError;

use pushfix_types::plan::{Locator, PatchOp};
use regex::Regex;
use tracing::debug;

/// A locator with its patterns compiled and validated.
#[derive(Debug, Clone)]
pub enum CompiledLocator {
    Literal { find: String },
    Regex { pattern: Regex },
    Span { start: Regex, end: Regex },
}

impl CompiledLocator {
    /// Compile a plan locator. Regex compilation failures are fatal for the
    /// whole run; the caller is expected to compile every locator before
    /// mutating anything.
    pub fn compile(locator: &Locator) -> Result<Self, EditError> {
        match locator {
            Locator::Literal { find } => Ok(Self::Literal { find: find.clone() }),
            Locator::Regex { pattern } => Ok(Self::Regex {
                pattern: compile_pattern(pattern)?,
            }),
            Locator::Span { start, end } => Ok(Self::Span {
                start: compile_pattern(start)?,
                end: compile_pattern(end)?,
            }),
        }
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, EditError> {
    Regex::new(pattern).map_err(|source| EditError::BadPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A [`PatchOp`] ready to run.
#[derive(Debug, Clone)]
pub struct CompiledOp {
    pub locator: CompiledLocator,
    pub replacement: String,
}

/// Compile every op of a target. Returns the first compilation error, which
/// the caller must treat as fatal before any file is written.
pub fn compile_ops(ops: &[PatchOp]) -> Result<Vec<CompiledOp>, EditError> {
    ops.iter()
        .map(|op| {
            Ok(CompiledOp {
                locator: CompiledLocator::compile(&op.locator)?,
                replacement: op.replacement.clone(),
            })
        })
        .collect()
}

/// Result of one locate-and-replace attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The first matching span was replaced.
    Replaced(String),
    /// The locator matched nowhere; the content is untouched.
    NoMatch,
}

impl ReplaceOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ReplaceOutcome::Replaced(_))
    }
}

/// Replace the first matching span of `content`.
///
/// Regex locators interpolate `$1`-style capture groups into the
/// replacement; literal and span locators insert it verbatim. Only the first
/// match is replaced.
pub fn replace_block(
    content: &str,
    locator: &CompiledLocator,
    replacement: &str,
) -> ReplaceOutcome {
    let (range, expanded) = match locator {
        CompiledLocator::Literal { find } => match content.find(find.as_str()) {
            Some(at) => (at..at + find.len(), replacement.to_string()),
            None => return ReplaceOutcome::NoMatch,
        },
        CompiledLocator::Regex { pattern } => match pattern.captures(content) {
            Some(caps) => {
                let m = caps.get(0).expect("capture 0 always present");
                let mut expanded = String::new();
                caps.expand(replacement, &mut expanded);
                (m.range(), expanded)
            }
            None => return ReplaceOutcome::NoMatch,
        },
        CompiledLocator::Span { start, end } => {
            let Some(start_match) = start.find(content) else {
                return ReplaceOutcome::NoMatch;
            };
            // The end anchor is searched after the start match and excluded
            // from the replaced span.
            let Some(end_match) = end.find(&content[start_match.end()..]) else {
                return ReplaceOutcome::NoMatch;
            };
            let span_end = start_match.end() + end_match.start();
            (start_match.start()..span_end, replacement.to_string())
        }
    };

    debug!(start = range.start, end = range.end, "replacing span");

    let mut out = String::with_capacity(content.len() + expanded.len());
    out.push_str(&content[..range.start]);
    out.push_str(&expanded);
    out.push_str(&content[range.end..]);
    ReplaceOutcome::Replaced(out)
}

/// Per-op record of whether the locator matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub index: usize,
    pub matched: bool,
}

/// Run a target's ops in declared order, each over the previous output.
///
/// A non-matching op is a no-op for that position; later ops still run.
pub fn apply_ops(content: &str, ops: &[CompiledOp]) -> (String, Vec<OpOutcome>) {
    let mut current = content.to_string();
    let mut outcomes = Vec::with_capacity(ops.len());

    for (index, op) in ops.iter().enumerate() {
        match replace_block(&current, &op.locator, &op.replacement) {
            ReplaceOutcome::Replaced(next) => {
                current = next;
                outcomes.push(OpOutcome {
                    index,
                    matched: true,
                });
            }
            ReplaceOutcome::NoMatch => {
                debug!(index, "locator matched nowhere, leaving content as-is");
                outcomes.push(OpOutcome {
                    index,
                    matched: false,
                });
            }
        }
    }

    (current, outcomes)
}
