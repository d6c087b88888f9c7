use std::path::Path;

use crate::engine::{AlertingRule, EvalStatus, Group, RecordingRule, Rule};
use crate::policy::PartialResponseStrategy;

use super::{format_value, WireAlert, WireAlertInstance, WireGroup, WireRecording, WireRule};

/// Project a live group. `file` is the user-facing source file the group
/// came from; the group itself only knows its scratch copy.
pub fn project_group(group: &Group, file: &Path) -> WireGroup {
    WireGroup {
        name: group.name().to_string(),
        file: file.display().to_string(),
        rules: group
            .rules()
            .iter()
            .map(|r| project_rule(r.as_ref(), group.strategy()))
            .collect(),
        interval: group.interval().as_secs_f64(),
        partial_response_strategy: group.strategy(),
    }
}

/// Project one rule.
///
/// # Panics
///
/// If the rule is neither an [`AlertingRule`] nor a [`RecordingRule`].
pub fn project_rule(rule: &dyn Rule, strategy: PartialResponseStrategy) -> WireRule {
    let status = rule.status();
    let any = rule.as_any();

    if let Some(alerting) = any.downcast_ref::<AlertingRule>() {
        return WireRule::Alert(WireAlert {
            state: alerting.state(),
            name: alerting.name().to_string(),
            query: alerting.query().to_string(),
            duration: alerting.hold_duration().as_secs_f64(),
            labels: alerting.labels().clone(),
            annotations: alerting.annotations().clone(),
            alerts: active_alerts(alerting, strategy),
            health: status.health.as_str().to_string(),
            last_error: last_error(&status),
            evaluation_time: status.duration.as_secs_f64(),
            last_evaluation: status.timestamp,
        });
    }

    if let Some(recording) = any.downcast_ref::<RecordingRule>() {
        return WireRule::Recording(WireRecording {
            name: recording.name().to_string(),
            query: recording.query().to_string(),
            labels: recording.labels().clone(),
            health: status.health.as_str().to_string(),
            last_error: last_error(&status),
            evaluation_time: status.duration.as_secs_f64(),
            last_evaluation: status.timestamp,
        });
    }

    panic!("rule {:?}: unsupported type {}", rule.name(), rule.type_name());
}

/// Active alert instances of one alerting rule.
pub fn active_alerts(rule: &AlertingRule, strategy: PartialResponseStrategy) -> Vec<WireAlertInstance> {
    rule.active_alerts()
        .into_iter()
        .map(|a| WireAlertInstance {
            partial_response_strategy: strategy,
            labels: a.labels,
            annotations: a.annotations,
            state: a.state,
            active_at: a.active_at,
            value: format_value(a.value),
        })
        .collect()
}

fn last_error(status: &EvalStatus) -> String {
    status.last_error.clone().unwrap_or_default()
}
