//! Tests for schema types.

use super::*;

const MIXED_YAML: &str = r#"
groups:
  - name: api.alerts
    interval: 30s
    partial_response_strategy: warn
    rules:
      - alert: HighErrorRate
        expr: rate(errors_total[5m]) > 0.1
        for: 5m
        labels:
          severity: page
        annotations:
          summary: error rate above 10%
  - name: api.recording
    rules:
      - record: job:errors:rate5m
        expr: sum by (job) (rate(errors_total[5m]))
        labels:
          team: api
"#;

#[test]
fn parse_config_groups_with_policy_tag() {
    let doc = ConfigRuleGroups::from_yaml(MIXED_YAML).unwrap();
    assert_eq!(doc.groups.len(), 2);

    let alerts = &doc.groups[0];
    assert_eq!(alerts.name, "api.alerts");
    assert_eq!(alerts.interval.as_deref(), Some("30s"));
    assert_eq!(alerts.partial_response_strategy.as_deref(), Some("warn"));
    assert_eq!(alerts.rules.len(), 1);

    let RuleDef::Alerting(rule) = &alerts.rules[0] else {
        panic!("expected alerting rule, got {:?}", alerts.rules[0]);
    };
    assert_eq!(rule.alert, "HighErrorRate");
    assert_eq!(rule.for_duration.as_deref(), Some("5m"));
    assert_eq!(rule.labels["severity"], "page");
    assert_eq!(rule.annotations["summary"], "error rate above 10%");

    let recording = &doc.groups[1];
    assert!(recording.partial_response_strategy.is_none());
    assert!(matches!(recording.rules[0], RuleDef::Recording(_)));
    assert_eq!(recording.rules[0].name(), "job:errors:rate5m");
}

#[test]
fn stripped_groups_reject_policy_field() {
    // The engine-facing schema is strict: the tag must be removed first.
    let err = RuleGroups::from_yaml(MIXED_YAML).unwrap_err();
    assert!(err.to_string().contains("partial_response_strategy"), "{err}");
}

#[test]
fn into_parts_round_trips_through_stripped_schema() {
    let doc = ConfigRuleGroups::from_yaml(MIXED_YAML).unwrap();
    let groups: Vec<RuleGroup> = doc
        .groups
        .into_iter()
        .map(|g| g.into_parts().0)
        .collect();
    let stripped = RuleGroups { groups };

    let yaml = serde_yaml::to_string(&stripped).unwrap();
    assert!(!yaml.contains("partial_response_strategy"));

    let reparsed = RuleGroups::from_yaml(&yaml).unwrap();
    assert_eq!(reparsed, stripped);
}

#[test]
fn rule_with_both_alert_and_record_is_rejected() {
    let yaml = r#"
groups:
  - name: broken
    rules:
      - alert: A
        record: b
        expr: up
"#;
    assert!(RuleGroups::from_yaml(yaml).is_err());
}

#[test]
fn empty_file_has_no_groups() {
    assert_eq!(RuleGroups::from_yaml("").unwrap(), RuleGroups::default());
    assert_eq!(
        ConfigRuleGroups::from_yaml("  \n").unwrap(),
        ConfigRuleGroups::default()
    );
}

#[test]
fn validate_reports_every_problem() {
    let yaml = r#"
groups:
  - name: dup
    interval: soon
    rules:
      - alert: ""
        expr: up == 0
        for: later
  - name: dup
    rules:
      - record: r
        expr: ""
"#;
    let groups = RuleGroups::from_yaml(yaml).unwrap();
    let errs = groups.validate();
    assert_eq!(errs.len(), 5, "{errs:?}");
    assert!(errs.iter().any(|e| e.contains("repeated")));
    assert!(errs.iter().any(|e| e.contains("name must not be empty")));
    assert!(errs.iter().any(|e| e.contains("expr must not be empty")));
}

#[test]
fn validate_accepts_well_formed_groups() {
    let doc = ConfigRuleGroups::from_yaml(MIXED_YAML).unwrap();
    let stripped = RuleGroups {
        groups: doc.groups.into_iter().map(|g| g.into_parts().0).collect(),
    };
    assert!(stripped.validate().is_empty());
}
