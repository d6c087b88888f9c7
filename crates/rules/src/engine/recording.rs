use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::query::{QueryFn, Sample};
use crate::schema::{Labels, RecordingRuleDef};

use super::rule::{EvalError, EvalStatus, Rule, StatusCell};

const METRIC_NAME_LABEL: &str = "__name__";

/// Records the result of a query under a new series name.
pub struct RecordingRule {
    name: String,
    query: String,
    labels: Labels,
    last: Mutex<Vec<Sample>>,
    status: StatusCell,
}

impl RecordingRule {
    pub fn new(name: impl Into<String>, query: impl Into<String>, labels: Labels) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            labels,
            last: Mutex::new(Vec::new()),
            status: StatusCell::default(),
        }
    }

    pub fn from_def(def: &RecordingRuleDef) -> Self {
        Self::new(&def.record, &def.expr, def.labels.clone())
    }

    /// Samples produced by the last successful evaluation.
    pub fn last_samples(&self) -> Vec<Sample> {
        self.last.lock().expect("recording lock poisoned").clone()
    }

    async fn eval_inner(&self, ts: DateTime<Utc>, query: &QueryFn) -> Result<(), EvalError> {
        let samples = query(self.query.clone(), ts).await?;

        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(samples.len());
        for sample in samples {
            let mut metric = sample.metric;
            metric.insert(METRIC_NAME_LABEL.to_string(), self.name.clone());
            metric.extend(self.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
            if !seen.insert(metric.clone()) {
                return Err(EvalError::DuplicateLabelSet(metric));
            }
            out.push(Sample::new(metric, sample.value));
        }

        *self.last.lock().expect("recording lock poisoned") = out;
        Ok(())
    }
}

impl std::fmt::Debug for RecordingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRule")
            .field("name", &self.name)
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Rule for RecordingRule {
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
