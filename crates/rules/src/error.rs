//! Error types for partitioning, reloading and streaming rules.

use std::fmt;
use std::path::PathBuf;

use crate::engine::EngineError;
use crate::policy::PartialResponseStrategy;

/// Errors that can occur while reloading or listing rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error on a source file or the scratch directory.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse/deserialization error in a source file.
    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid `partial_response_strategy` value.
    #[error(transparent)]
    Policy(#[from] PolicyParseError),

    /// A per-policy bucket could not be serialized.
    #[error("{}: failed to marshal rule groups: {source}", .path.display())]
    Marshal {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Parsed input carries a policy with no pooled engine.
    #[error("no engine found for strategy {0}")]
    NoEngine(PartialResponseStrategy),

    /// The engine for a policy refused its new file set.
    #[error("strategy {strategy}: {source}")]
    Engine {
        strategy: PartialResponseStrategy,
        #[source]
        source: EngineError,
    },

    /// The consumer of a rules stream failed to accept a message.
    #[error("failed to send rules response: {0}")]
    Send(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The caller cancelled a rules stream.
    #[error("rules stream cancelled")]
    Cancelled,

    /// The rule file watcher could not be set up.
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// A group's policy tag is not one of the known strategies.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{}: group {group:?}: failed to unmarshal 'partial_response_strategy'. Possible values are {}. Got: {value}",
    .file.display(),
    PartialResponseStrategy::allowed_values()
)]
pub struct PolicyParseError {
    pub file: PathBuf,
    pub group: String,
    pub value: String,
}

/// Every recoverable error from one reload cycle.
#[derive(Debug, Default)]
pub struct MultiError(Vec<RuleError>);

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: impl Into<RuleError>) {
        self.0.push(err.into());
    }

    pub fn extend(&mut self, other: MultiError) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn errors(&self) -> &[RuleError] {
        &self.0
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> std::result::Result<(), MultiError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.0.as_slice() {
            return write!(f, "{only}");
        }
        write!(f, "{} errors: ", self.0.len())?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl IntoIterator for MultiError {
    type Item = RuleError;
    type IntoIter = std::vec::IntoIter<RuleError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_multi_error_is_ok() {
        assert!(MultiError::new().into_result().is_ok());
    }

    #[test]
    fn single_error_renders_as_itself() {
        let mut errs = MultiError::new();
        errs.push(RuleError::NoEngine(PartialResponseStrategy::Warn));
        assert_eq!(errs.to_string(), "no engine found for strategy WARN");
    }

    #[test]
    fn multiple_errors_are_joined() {
        let mut errs = MultiError::new();
        errs.push(RuleError::NoEngine(PartialResponseStrategy::Warn));
        errs.push(PolicyParseError {
            file: PathBuf::from("/rules/a.yaml"),
            group: "g".to_string(),
            value: "bogus".to_string(),
        });
        assert_eq!(errs.len(), 2);
        let msg = errs.to_string();
        assert!(msg.starts_with("2 errors: no engine found for strategy WARN; /rules/a.yaml"));
        assert!(msg.contains("Possible values are WARN,ABORT,IGNORE. Got: bogus"));
    }
}
