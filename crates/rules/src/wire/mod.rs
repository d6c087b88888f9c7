//! Stable output records for rule groups, rules and active alerts.
//!
//! These are what listings and streams carry; the live engine objects never
//! leave the crate boundary.

mod projection;
mod value;

#[cfg(test)]
mod tests;

pub use self::projection::{active_alerts, project_group, project_rule};
pub use self::value::{format_value, parse_value};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::AlertState;
use crate::policy::PartialResponseStrategy;
use crate::schema::Labels;

/// One rule group as seen by API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGroup {
    pub name: String,
    /// Original user file (not the scratch copy).
    pub file: String,
    pub rules: Vec<WireRule>,
    /// Evaluation interval in seconds.
    pub interval: f64,
    pub partial_response_strategy: PartialResponseStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireRule {
    #[serde(rename = "alerting")]
    Alert(WireAlert),
    #[serde(rename = "recording")]
    Recording(WireRecording),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAlert {
    pub state: AlertState,
    pub name: String,
    pub query: String,
    /// `for` duration in seconds.
    pub duration: f64,
    pub labels: Labels,
    pub annotations: Labels,
    pub alerts: Vec<WireAlertInstance>,
    pub health: String,
    pub last_error: String,
    /// Last evaluation duration in seconds.
    pub evaluation_time: f64,
    pub last_evaluation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecording {
    pub name: String,
    pub query: String,
    pub labels: Labels,
    pub health: String,
    pub last_error: String,
    pub evaluation_time: f64,
    pub last_evaluation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAlertInstance {
    pub partial_response_strategy: PartialResponseStrategy,
    pub labels: Labels,
    pub annotations: Labels,
    pub state: AlertState,
    pub active_at: DateTime<Utc>,
    /// Scientific notation, lossless (see [`format_value`]).
    pub value: String,
}

impl WireRule {
    pub fn name(&self) -> &str {
        match self {
            WireRule::Alert(a) => &a.name,
            WireRule::Recording(r) => &r.name,
        }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, WireRule::Alert(_))
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, WireRule::Recording(_))
    }
}
