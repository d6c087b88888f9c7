use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rulemux_core::parse_duration;

use crate::policy::PartialResponseStrategy;
use crate::query::QueryFn;
use crate::schema::{RuleDef, RuleGroup};

use super::alerting::AlertingRule;
use super::metrics::EngineMetrics;
use super::recording::RecordingRule;
use super::rule::Rule;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// A loaded rule group: rules evaluated together on one interval.
pub struct Group {
    name: String,
    file: PathBuf,
    interval: Duration,
    strategy: PartialResponseStrategy,
    rules: Vec<Arc<dyn Rule>>,
    def: Option<RuleGroup>,
}

impl Group {
    /// Build a group from already constructed rules.
    pub fn new(
        name: impl Into<String>,
        file: impl Into<PathBuf>,
        interval: Duration,
        strategy: PartialResponseStrategy,
        rules: Vec<Arc<dyn Rule>>,
    ) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            interval,
            strategy,
            rules,
            def: None,
        }
    }

    /// Build from a parsed definition; the group's own interval overrides
    /// `default_interval`.
    pub fn from_def(
        def: &RuleGroup,
        file: &Path,
        default_interval: Duration,
        strategy: PartialResponseStrategy,
    ) -> Self {
        let interval = def
            .interval
            .as_deref()
            .and_then(|i| parse_duration(i).ok())
            .unwrap_or(default_interval);

        let rules = def
            .rules
            .iter()
            .map(|r| -> Arc<dyn Rule> {
                match r {
                    RuleDef::Alerting(a) => Arc::new(AlertingRule::from_def(a)),
                    RuleDef::Recording(r) => Arc::new(RecordingRule::from_def(r)),
                }
            })
            .collect();

        Self {
            def: Some(def.clone()),
            ..Self::new(&def.name, file, interval, strategy, rules)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The file this group was loaded from.
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn strategy(&self) -> PartialResponseStrategy {
        self.strategy
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Alerting rules of this group, in order.
    pub fn alerting_rules(&self) -> Vec<Arc<AlertingRule>> {
        self.rules
            .iter()
            .filter_map(|r| Arc::clone(r).into_any().downcast::<AlertingRule>().ok())
            .collect()
    }

    /// Identity used for metrics and reuse: file plus name.
    pub fn key(&self) -> String {
        format!("{};{}", self.file.display(), self.name)
    }

    /// Whether this group was built from the same definition, file and
    /// interval, so its evaluation state can be kept across a reload.
    pub(crate) fn matches(&self, def: &RuleGroup, file: &Path, default_interval: Duration) -> bool {
        let interval = def
            .interval
            .as_deref()
            .and_then(|i| parse_duration(i).ok())
            .unwrap_or(default_interval);
        self.file == file && self.interval == interval && self.def.as_ref() == Some(def)
    }

    /// Evaluate every rule once, in order. Returns the number of failures.
    pub async fn eval(&self, query: &QueryFn, metrics: &EngineMetrics) -> usize {
        let started = Instant::now();
        let ts = Utc::now();
        let mut failures = 0;

        for rule in &self.rules {
            if let Err(e) = rule.eval(ts, query).await {
                failures += 1;
                warn!(
                    group = %self.name,
                    rule = %rule.name(),
                    strategy = %self.strategy,
                    error = %e,
                    "rule evaluation failed"
                );
            }
        }

        metrics.record_iteration(&self.key(), self.rules.len(), failures, started.elapsed());
        failures
    }

    /// Evaluate on every tick until `cancel` fires.
    pub async fn run(self: Arc<Self>, query: QueryFn, metrics: EngineMetrics, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!(group = %self.name, interval = ?self.interval, "group loop started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.eval(&query, &metrics).await;
                }
            }
        }

        debug!(group = %self.name, "group loop stopped");
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("interval", &self.interval)
            .field("strategy", &self.strategy)
            .field("rules", &self.rules.len())
            .finish()
    }
}
