//! Policy-stripped rule groups, as consumed by an evaluation engine.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use rulemux_core::parse_duration;

/// Sorted label set.
pub type Labels = BTreeMap<String, String>;

/// A rule file: an ordered list of groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGroups {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

/// A named, ordered collection of rules sharing one evaluation interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGroup {
    pub name: String,
    /// Evaluation interval; the engine default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// One rule definition. Alerting and recording shapes are told apart by the
/// `alert` / `record` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleDef {
    Alerting(AlertingRuleDef),
    Recording(RecordingRuleDef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertingRuleDef {
    pub alert: String,
    pub expr: String,
    /// How long a condition must hold before the alert fires.
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub annotations: Labels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingRuleDef {
    pub record: String,
    pub expr: String,
    #[serde(default, skip_serializing_if = "Labels::is_empty")]
    pub labels: Labels,
}

impl RuleDef {
    pub fn name(&self) -> &str {
        match self {
            RuleDef::Alerting(r) => &r.alert,
            RuleDef::Recording(r) => &r.record,
        }
    }

    pub fn expr(&self) -> &str {
        match self {
            RuleDef::Alerting(r) => &r.expr,
            RuleDef::Recording(r) => &r.expr,
        }
    }
}

impl RuleGroups {
    /// Parse a rule file. Whitespace-only input yields no groups.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Semantic checks serde cannot express. Returns every problem found.
    pub fn validate(&self) -> Vec<String> {
        let mut errs = Vec::new();
        let mut seen = HashSet::new();

        for group in &self.groups {
            if group.name.trim().is_empty() {
                errs.push("group name must not be empty".to_string());
            } else if !seen.insert(group.name.as_str()) {
                errs.push(format!("group {:?}: repeated in the same file", group.name));
            }

            if let Some(interval) = &group.interval {
                if let Err(e) = parse_duration(interval) {
                    errs.push(format!("group {:?}: {}", group.name, e));
                }
            }

            for (i, rule) in group.rules.iter().enumerate() {
                if rule.name().trim().is_empty() {
                    errs.push(format!("group {:?}, rule {}: name must not be empty", group.name, i));
                }
                if rule.expr().trim().is_empty() {
                    errs.push(format!("group {:?}, rule {:?}: expr must not be empty", group.name, rule.name()));
                }
                if let RuleDef::Alerting(AlertingRuleDef { for_duration: Some(d), .. }) = rule {
                    if let Err(e) = parse_duration(d) {
                        errs.push(format!("group {:?}, rule {:?}: {}", group.name, rule.name(), e));
                    }
                }
            }
        }

        errs
    }
}
