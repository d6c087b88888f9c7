use std::any::Any;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::engine::{AlertState, AlertingRule, EvalError, EvalStatus, Group, RecordingRule, Rule};
use crate::policy::PartialResponseStrategy;
use crate::query::{query_fn, QueryError, QueryFn, Sample};
use crate::schema::Labels;

use super::*;

#[test]
fn value_formatting() {
    assert_eq!(format_value(1.5), "1.5e+00");
    assert_eq!(format_value(0.0), "0e+00");
    assert_eq!(format_value(-2.5e-7), "-2.5e-07");
    assert_eq!(format_value(1234.0), "1.234e+03");
    assert_eq!(format_value(1e100), "1e+100");
    assert_eq!(format_value(f64::INFINITY), "+Inf");
    assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    assert_eq!(format_value(f64::NAN), "NaN");
}

#[test]
fn formatted_values_parse_back_exactly() {
    for v in [0.1, 1.0 / 3.0, f64::MAX, f64::MIN_POSITIVE, -42.125] {
        assert_eq!(parse_value(&format_value(v)), Some(v));
    }
    assert!(parse_value("NaN").unwrap().is_nan());
    assert_eq!(parse_value("garbage"), None);
}

struct Opaque;

#[async_trait]
impl Rule for Opaque {
    fn name(&self) -> &str {
        "mystery"
    }
    fn query(&self) -> &str {
        "vector(1)"
    }
    fn labels(&self) -> &Labels {
        static EMPTY: Labels = Labels::new();
        &EMPTY
    }
    fn status(&self) -> EvalStatus {
        EvalStatus::default()
    }
    async fn eval(&self, _: DateTime<Utc>, _: &QueryFn) -> Result<(), EvalError> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[test]
#[should_panic(expected = "rule \"mystery\": unsupported type")]
fn unknown_rule_type_panics() {
    project_rule(&Opaque, PartialResponseStrategy::Abort);
}

fn one_sample(value: f64) -> QueryFn {
    query_fn(move |_, _| async move {
        let metric: Labels = [("job".to_string(), "api".to_string())].into();
        Ok::<_, QueryError>(vec![Sample::new(metric, value)])
    })
}

#[tokio::test]
async fn group_projection_keeps_identity_and_order() {
    let alert = Arc::new(AlertingRule::new(
        "HighLatency",
        "latency > 1",
        Duration::from_secs(60),
        [("severity".to_string(), "warn".to_string())].into(),
        Labels::new(),
    ));
    alert.eval(Utc::now(), &one_sample(1.5)).await.unwrap();
    let record = Arc::new(RecordingRule::new("job:latency", "avg(latency)", Labels::new()));

    let group = Group::new(
        "latency",
        "/data/.tmp-rules/api.yaml.abc.WARN",
        Duration::from_secs(30),
        PartialResponseStrategy::Warn,
        vec![alert as Arc<dyn Rule>, record as Arc<dyn Rule>],
    );

    let wire = project_group(&group, Path::new("/etc/rules/api.yaml"));
    assert_eq!(wire.name, "latency");
    assert_eq!(wire.file, "/etc/rules/api.yaml");
    assert_eq!(wire.interval, 30.0);
    assert_eq!(wire.partial_response_strategy, PartialResponseStrategy::Warn);
    assert_eq!(
        wire.rules.iter().map(|r| r.name()).collect::<Vec<_>>(),
        vec!["HighLatency", "job:latency"]
    );

    let WireRule::Alert(a) = &wire.rules[0] else {
        panic!("expected an alerting rule");
    };
    assert_eq!(a.state, AlertState::Pending);
    assert_eq!(a.duration, 60.0);
    assert_eq!(a.health, "ok");
    assert_eq!(a.last_error, "");
    assert_eq!(a.alerts.len(), 1);
    assert_eq!(a.alerts[0].value, "1.5e+00");
    assert_eq!(a.alerts[0].partial_response_strategy, PartialResponseStrategy::Warn);
    assert_eq!(a.alerts[0].labels["alertname"], "HighLatency");

    let WireRule::Recording(r) = &wire.rules[1] else {
        panic!("expected a recording rule");
    };
    assert_eq!(r.health, "unknown");
    assert!(r.last_evaluation.is_none());
}

#[test]
fn wire_json_shape() {
    let rule = WireRule::Recording(WireRecording {
        name: "job:up".to_string(),
        query: "up".to_string(),
        labels: Labels::new(),
        health: "ok".to_string(),
        last_error: String::new(),
        evaluation_time: 0.0,
        last_evaluation: None,
    });
    let json = serde_json::to_value(&rule).unwrap();
    assert_eq!(json["type"], "recording");
    assert_eq!(json["name"], "job:up");
    assert!(json.get("lastError").is_some());
    assert!(json.get("evaluationTime").is_some());
}
