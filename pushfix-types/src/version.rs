use serde::{Deserialize, Serialize};
use std::fmt;

/// A two-field version record as found in a build descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Monotonic build identifier.
    pub code: u64,

    /// Dotted human-readable version; only the last segment is ever
    /// incremented mechanically.
    pub name: String,
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.name)
    }
}

/// Outcome of computing the next version for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBump {
    pub record: VersionRecord,

    /// True when the sentinel was absent and the ledger reset to 1 / "1.0".
    pub first_run: bool,

    /// True when the current code could not be parsed and the ledger
    /// degraded to 1 instead of incrementing.
    #[serde(default)]
    pub parse_fallback: bool,
}
