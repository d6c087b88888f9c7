//! The [`Rule`] trait implemented by every live rule, and its evaluation status.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::{QueryError, QueryFn};
use crate::schema::Labels;

/// Health of a rule after its most recent evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleHealth {
    /// Not evaluated yet.
    #[default]
    Unknown,
    Ok,
    Err,
}

impl RuleHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleHealth::Unknown => "unknown",
            RuleHealth::Ok => "ok",
            RuleHealth::Err => "err",
        }
    }
}

/// Errors from evaluating a single rule.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("vector contains metrics with the same labelset after applying rule labels: {0:?}")]
    DuplicateLabelSet(Labels),
}

/// Snapshot of a rule's last evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalStatus {
    pub health: RuleHealth,
    pub last_error: Option<String>,
    pub duration: Duration,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A live rule owned by a group.
///
/// The projection layer knows the concrete alerting and recording types and
/// downcasts through [`Rule::as_any`].
#[async_trait]
pub trait Rule: Any + Send + Sync {
    fn name(&self) -> &str;

    /// Query text as configured.
    fn query(&self) -> &str;

    /// Labels attached to everything the rule produces.
    fn labels(&self) -> &Labels;

    fn status(&self) -> EvalStatus;

    /// Evaluate at `ts`, updating internal state and status.
    async fn eval(&self, ts: DateTime<Utc>, query: &QueryFn) -> Result<(), EvalError>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Interior-mutable [`EvalStatus`] shared by the concrete rule types.
#[derive(Debug, Default)]
pub(crate) struct StatusCell(Mutex<EvalStatus>);

impl StatusCell {
    pub(crate) fn get(&self) -> EvalStatus {
        self.0.lock().expect("rule status lock poisoned").clone()
    }

    pub(crate) fn record(&self, ts: DateTime<Utc>, started: Instant, outcome: &Result<(), EvalError>) {
        let mut status = self.0.lock().expect("rule status lock poisoned");
        status.timestamp = Some(ts);
        status.duration = started.elapsed();
        match outcome {
            Ok(()) => {
                status.health = RuleHealth::Ok;
                status.last_error = None;
            }
            Err(e) => {
                status.health = RuleHealth::Err;
                status.last_error = Some(e.to_string());
            }
        }
    }
}
