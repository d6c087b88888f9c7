//! Rule evaluation engines.
//!
//! The orchestrator drives engines through the [`RuleEngine`] trait; one
//! engine exists per partial response strategy. [`Engine`] is the bundled
//! implementation: it loads rule files, evaluates groups on their interval
//! and keeps alert state.

mod alerting;
mod core;
mod group;
mod metrics;
mod recording;
mod rule;

#[cfg(test)]
mod tests;

pub use self::alerting::{Alert, AlertState, AlertingRule, ALERT_NAME_LABEL};
pub use self::core::Engine;
pub use self::group::Group;
pub use self::metrics::EngineMetrics;
pub use self::recording::RecordingRule;
pub use self::rule::{EvalError, EvalStatus, Rule, RuleHealth};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Errors an engine reports when refusing a new file set.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{}: {}", .path.display(), .errors.join("; "))]
    Invalid { path: PathBuf, errors: Vec<String> },

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl EngineError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

/// A rule evaluation engine bound to one partial response strategy.
#[async_trait]
pub trait RuleEngine: Send + Sync + 'static {
    /// Currently loaded groups, in file then definition order.
    fn rule_groups(&self) -> Vec<Arc<Group>>;

    /// Alerting rules across every loaded group.
    fn alerting_rules(&self) -> Vec<Arc<AlertingRule>> {
        self.rule_groups()
            .iter()
            .flat_map(|g| g.alerting_rules())
            .collect()
    }

    /// Replace the loaded file set. On error the previous groups stay
    /// loaded.
    async fn update(&self, interval: Duration, files: &[PathBuf]) -> Result<(), EngineError>;

    /// Start evaluating loaded groups in the background.
    async fn run(&self);

    /// Stop every group loop and wait for it to finish.
    async fn stop(&self);
}
