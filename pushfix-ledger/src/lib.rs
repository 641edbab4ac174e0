//! Version ledger: compute and persist the next version of a build
//! descriptor.
//!
//! The ledger is deliberately dumb. Fields are located by pattern, not by
//! parsing the descriptor's grammar; the name's last segment is bumped by
//! mechanical digit incrementing, with no semver validation. State ("has
//! this ledger run before") lives in a sentinel marker file, loaded once at
//! run start as a [`LedgerState`] value and passed explicitly into the bump
//! computation, never re-checked ambiently mid-run.

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use fs_err as fs;
use pushfix_types::version::{VersionBump, VersionRecord};
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid version field pattern `{pattern}`: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("write sentinel {path}: {source}")]
    WriteSentinel {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Compiled patterns locating the two version fields in a descriptor.
///
/// The code pattern must expose two capture groups (prefix, digits); the
/// name pattern three (prefix, value, closing delimiter).
#[derive(Debug, Clone)]
pub struct FieldPatterns {
    pub code: Regex,
    pub name: Regex,
}

/// Gradle-kts shaped defaults: `versionCode = 7` / `versionName = "2.3"`.
pub const DEFAULT_CODE_PATTERN: &str = r"(versionCode\s*=\s*)(\d+)";
pub const DEFAULT_NAME_PATTERN: &str = r#"(versionName\s*=\s*")([^"]+)(")"#;

impl FieldPatterns {
    pub fn new(code: &str, name: &str) -> Result<Self, LedgerError> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| LedgerError::BadPattern {
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            code: compile(code)?,
            name: compile(name)?,
        })
    }

    pub fn gradle_kts() -> Self {
        Self::new(DEFAULT_CODE_PATTERN, DEFAULT_NAME_PATTERN)
            .expect("default field patterns compile")
    }
}

/// Ledger state, loaded once from sentinel existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerState {
    pub initialized: bool,
}

pub fn load_state(sentinel: &Utf8Path) -> LedgerState {
    LedgerState {
        initialized: sentinel.exists(),
    }
}

/// Compute the next version for a run.
///
/// First run (sentinel absent) resets to `1` / `"1.0"` regardless of what
/// the descriptor says. Recurring runs increment the current code, degrading
/// to `1` when it cannot be read; the fallback is logged, never silent.
pub fn next_version(
    descriptor: &str,
    state: LedgerState,
    patterns: &FieldPatterns,
) -> VersionBump {
    if !state.initialized {
        info!("sentinel absent, resetting ledger to 1 (1.0)");
        return VersionBump {
            record: VersionRecord {
                code: 1,
                name: "1.0".to_string(),
            },
            first_run: true,
            parse_fallback: false,
        };
    }

    let (code, parse_fallback) = match patterns
        .code
        .captures(descriptor)
        .and_then(|caps| caps[2].parse::<u64>().ok())
    {
        Some(current) => (current + 1, false),
        None => {
            warn!("could not read the current version code, falling back to 1");
            (1, true)
        }
    };

    let name = match patterns.name.captures(descriptor) {
        Some(caps) => bump_name(&caps[2]),
        None => {
            warn!("could not read the current version name, falling back to 1.0");
            "1.0".to_string()
        }
    };

    VersionBump {
        record: VersionRecord { code, name },
        first_run: false,
        parse_fallback,
    }
}

/// Increment the last dotted segment, or append `.1` when it is not numeric.
fn bump_name(current: &str) -> String {
    let mut parts: Vec<String> = current.split('.').map(str::to_string).collect();
    match parts.last().and_then(|last| last.parse::<u64>().ok()) {
        Some(last) => {
            let end = parts.len() - 1;
            parts[end] = (last + 1).to_string();
            parts.join(".")
        }
        None => format!("{current}.1"),
    }
}

/// Rewrite both version fields, leaving every other byte of the descriptor
/// untouched. Fields that match nowhere are left alone.
pub fn rewrite_descriptor(
    descriptor: &str,
    record: &VersionRecord,
    patterns: &FieldPatterns,
) -> String {
    let code = record.code;
    let out = patterns.code.replace(descriptor, |caps: &regex::Captures| {
        format!("{}{}", &caps[1], code)
    });
    let out = patterns.name.replace(&out, |caps: &regex::Captures| {
        format!("{}{}{}", &caps[1], record.name, &caps[3])
    });
    out.into_owned()
}

/// Create the sentinel on first run. Never deletes it; manual removal is the
/// documented way to reset the ledger.
pub fn persist_state(sentinel: &Utf8Path, started_at: DateTime<Utc>) -> Result<(), LedgerError> {
    let body = format!(
        "Initialized at: {started_at}\n\
         Do not delete this file if you want to keep the sequential version count.\n"
    );
    fs::write(sentinel, body).map_err(|source| LedgerError::WriteSentinel {
        path: sentinel.to_string(),
        source,
    })
}

/// Commit message used when a plan does not provide one.
pub fn default_commit_message(bump: &VersionBump) -> String {
    if bump.first_run {
        format!("Reset version ledger - v{}", bump.record.name)
    } else {
        format!("Bump version code: {}", bump.record.code)
    }
}
