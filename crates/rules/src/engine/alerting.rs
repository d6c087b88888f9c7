//! Alerting rules: conditions that go pending, then firing once they have
//! held for the configured duration.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rulemux_core::parse_duration;

use crate::query::QueryFn;
use crate::schema::{AlertingRuleDef, Labels};

use super::rule::{EvalError, EvalStatus, Rule, StatusCell};

/// Label carrying the alerting rule's name on each alert.
pub const ALERT_NAME_LABEL: &str = "alertname";
const METRIC_NAME_LABEL: &str = "__name__";

/// Lifecycle state of an alert, ordered by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    #[default]
    Inactive,
    Pending,
    Firing,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Inactive => "inactive",
            AlertState::Pending => "pending",
            AlertState::Firing => "firing",
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One active alert instance produced by an alerting rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub labels: Labels,
    pub annotations: Labels,
    pub state: AlertState,
    pub active_at: DateTime<Utc>,
    pub value: f64,
}

pub struct AlertingRule {
    name: String,
    query: String,
    hold: Duration,
    labels: Labels,
    annotations: Labels,
    active: Mutex<BTreeMap<Labels, Alert>>,
    status: StatusCell,
}

impl AlertingRule {
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        hold: Duration,
        labels: Labels,
        annotations: Labels,
    ) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            hold,
            labels,
            annotations,
            active: Mutex::new(BTreeMap::new()),
            status: StatusCell::default(),
        }
    }

    /// Build from a validated definition. An unparseable `for` is treated
    /// as zero; validation rejects it before this point.
    pub fn from_def(def: &AlertingRuleDef) -> Self {
        let hold = def
            .for_duration
            .as_deref()
            .and_then(|d| parse_duration(d).ok())
            .unwrap_or_default();
        Self::new(&def.alert, &def.expr, hold, def.labels.clone(), def.annotations.clone())
    }

    /// How long a condition must hold before firing.
    pub fn hold_duration(&self) -> Duration {
        self.hold
    }

    pub fn annotations(&self) -> &Labels {
        &self.annotations
    }

    /// Currently active alerts, ordered by label set.
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active
            .lock()
            .expect("alert state lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Most severe state among active alerts.
    pub fn state(&self) -> AlertState {
        self.active
            .lock()
            .expect("alert state lock poisoned")
            .values()
            .map(|a| a.state)
            .max()
            .unwrap_or_default()
    }

    fn alert_labels(&self, metric: &Labels) -> Labels {
        let mut labels: Labels = metric
            .iter()
            .filter(|(k, _)| k.as_str() != METRIC_NAME_LABEL)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        labels.insert(ALERT_NAME_LABEL.to_string(), self.name.clone());
        labels
    }

    async fn eval_inner(&self, ts: DateTime<Utc>, query: &QueryFn) -> Result<(), EvalError> {
        let samples = query(self.query.clone(), ts).await?;

        let mut seen: BTreeMap<Labels, f64> = BTreeMap::new();
        for sample in samples {
            let labels = self.alert_labels(&sample.metric);
            if seen.insert(labels.clone(), sample.value).is_some() {
                return Err(EvalError::DuplicateLabelSet(labels));
            }
        }

        let hold = chrono::Duration::from_std(self.hold).unwrap_or_else(|_| chrono::Duration::zero());
        let mut active = self.active.lock().expect("alert state lock poisoned");
        active.retain(|labels, _| seen.contains_key(labels));

        for (labels, value) in seen {
            let alert = active.entry(labels.clone()).or_insert_with(|| Alert {
                labels,
                annotations: self.annotations.clone(),
                state: AlertState::Pending,
                active_at: ts,
                value,
            });
            alert.value = value;
            if alert.state == AlertState::Pending && ts - alert.active_at >= hold {
                alert.state = AlertState::Firing;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AlertingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertingRule")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("hold", &self.hold)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Rule for AlertingRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self) -> &str {
        &self.query
    }

    fn labels(&self) -> &Labels {
        &self.labels
    }

    fn status(&self) -> EvalStatus {
        self.status.get()
    }

    async fn eval(&self, ts: DateTime<Utc>, query: &QueryFn) -> Result<(), EvalError> {
        let started = Instant::now();
        let outcome = self.eval_inner(ts, query).await;
        self.status.record(ts, started, &outcome);
        outcome
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
