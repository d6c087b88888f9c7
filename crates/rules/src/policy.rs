//! Partial response strategy: the consistency policy attached to every rule group.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How partial query failures are treated for rules of a group.
///
/// The set is closed: every group resolves to exactly one member, and each
/// member owns one evaluation engine.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartialResponseStrategy {
    /// Accept partial results and surface warnings.
    Warn,
    /// Fail the whole query on any partial failure. Default for rules.
    #[default]
    Abort,
    /// Accept partial results silently.
    Ignore,
}

impl PartialResponseStrategy {
    /// Every member, in declaration order.
    pub const ALL: [PartialResponseStrategy; 3] = [Self::Warn, Self::Abort, Self::Ignore];

    /// Canonical upper-case name, as written into scratch file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "WARN",
            Self::Abort => "ABORT",
            Self::Ignore => "IGNORE",
        }
    }

    /// Lower-case name used as the `strategy` metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Warn => "warn",
            Self::Abort => "abort",
            Self::Ignore => "ignore",
        }
    }

    /// Comma-separated list of accepted values, for error messages.
    pub fn allowed_values() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Resolve an optional policy tag; absent or empty means [`Abort`](Self::Abort).
    pub fn resolve(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(s) => s.parse(),
        }
    }
}

impl fmt::Display for PartialResponseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartialResponseStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "WARN" => Ok(Self::Warn),
            "ABORT" => Ok(Self::Abort),
            "IGNORE" => Ok(Self::Ignore),
            _ => Err(s.to_string()),
        }
    }
}
