use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use prometheus::Registry;

use crate::policy::PartialResponseStrategy;
use crate::query::{query_fn, QueryError, QueryFn, Sample};
use crate::schema::Labels;

use super::*;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn fixed(samples: Vec<Sample>) -> QueryFn {
    query_fn(move |_, _| {
        let samples = samples.clone();
        async move { Ok(samples) }
    })
}

fn engine(query: QueryFn) -> Engine {
    Engine::new(PartialResponseStrategy::Abort, query, &Registry::new()).unwrap()
}

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

const TWO_GROUPS: &str = r#"
groups:
  - name: api
    interval: 30s
    rules:
      - alert: HighErrorRate
        expr: rate(errors[5m]) > 0.1
        for: 5m
        labels:
          severity: page
      - record: job:errors:rate5m
        expr: sum by (job) (rate(errors[5m]))
  - name: db
    rules:
      - alert: DbDown
        expr: up{job="db"} == 0
"#;

#[tokio::test]
async fn update_loads_groups_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "a.yaml", TWO_GROUPS);
    let engine = engine(fixed(vec![]));

    engine.update(Duration::from_secs(60), &[path.clone()]).await.unwrap();

    let groups = engine.rule_groups();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].name(), "api");
    assert_eq!(groups[0].interval(), Duration::from_secs(30));
    assert_eq!(groups[0].file(), path.as_path());
    assert_eq!(groups[1].name(), "db");
    assert_eq!(groups[1].interval(), Duration::from_secs(60));
    assert_eq!(engine.alerting_rules().len(), 2);
    assert_eq!(
        engine.alerting_rules()[0].hold_duration(),
        Duration::from_secs(300)
    );
}

#[tokio::test]
async fn invalid_file_keeps_previous_groups() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(&dir, "good.yaml", TWO_GROUPS);
    let bad = write(&dir, "bad.yaml", "groups:\n  - name: x\n    rules:\n      - alert: A\n        expr: ''\n");
    let engine = engine(fixed(vec![]));

    engine.update(Duration::from_secs(60), &[good.clone()]).await.unwrap();
    let err = engine
        .update(Duration::from_secs(60), &[good, bad])
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Invalid { .. }));
    assert_eq!(engine.rule_groups().len(), 2);
}

#[tokio::test]
async fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine(fixed(vec![]));
    let err = engine
        .update(Duration::from_secs(60), &[dir.path().join("nope.yaml")])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }));
}

#[tokio::test]
async fn unchanged_groups_are_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "a.yaml", TWO_GROUPS);
    let engine = engine(fixed(vec![]));

    engine.update(Duration::from_secs(60), &[path.clone()]).await.unwrap();
    let before = engine.rule_groups();

    let edited = TWO_GROUPS.replace("up{job=\"db\"} == 0", "up{job=\"db\"} < 1");
    std::fs::write(&path, edited).unwrap();
    engine.update(Duration::from_secs(60), &[path]).await.unwrap();
    let after = engine.rule_groups();

    assert!(Arc::ptr_eq(&before[0], &after[0]));
    assert!(!Arc::ptr_eq(&before[1], &after[1]));
}

#[tokio::test]
async fn empty_file_list_clears_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "a.yaml", TWO_GROUPS);
    let engine = engine(fixed(vec![]));

    engine.update(Duration::from_secs(60), &[path]).await.unwrap();
    engine.update(Duration::from_secs(60), &[]).await.unwrap();
    assert!(engine.rule_groups().is_empty());
}

#[tokio::test]
async fn alert_goes_pending_then_firing() {
    let query = fixed(vec![Sample::new(labels(&[("__name__", "up"), ("job", "db")]), 0.0)]);
    let rule = AlertingRule::new(
        "DbDown",
        "up == 0",
        Duration::from_secs(300),
        labels(&[("severity", "page")]),
        labels(&[("summary", "db is down")]),
    );

    let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    rule.eval(t0, &query).await.unwrap();

    let alerts = rule.active_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].state, AlertState::Pending);
    assert_eq!(alerts[0].active_at, t0);
    assert_eq!(
        alerts[0].labels,
        labels(&[("alertname", "DbDown"), ("job", "db"), ("severity", "page")])
    );
    assert_eq!(alerts[0].annotations["summary"], "db is down");
    assert_eq!(rule.state(), AlertState::Pending);

    rule.eval(t0 + chrono::Duration::minutes(5), &query).await.unwrap();
    assert_eq!(rule.state(), AlertState::Firing);
    assert_eq!(rule.active_alerts()[0].active_at, t0);
    assert_eq!(rule.status().health, RuleHealth::Ok);
}

#[tokio::test]
async fn resolved_alerts_are_dropped() {
    let empty = fixed(vec![]);
    let firing = fixed(vec![Sample::new(labels(&[("job", "db")]), 1.0)]);
    let rule = AlertingRule::new("A", "x", Duration::ZERO, Labels::new(), Labels::new());

    rule.eval(Utc::now(), &firing).await.unwrap();
    assert_eq!(rule.state(), AlertState::Firing);

    rule.eval(Utc::now(), &empty).await.unwrap();
    assert!(rule.active_alerts().is_empty());
    assert_eq!(rule.state(), AlertState::Inactive);
}

#[tokio::test]
async fn duplicate_label_sets_fail_evaluation() {
    // Both samples collapse to the same set once __name__ is dropped.
    let query = fixed(vec![
        Sample::new(labels(&[("__name__", "a"), ("job", "x")]), 1.0),
        Sample::new(labels(&[("__name__", "b"), ("job", "x")]), 1.0),
    ]);
    let rule = AlertingRule::new("A", "a or b", Duration::ZERO, Labels::new(), Labels::new());

    let err = rule.eval(Utc::now(), &query).await.unwrap_err();
    assert!(matches!(err, EvalError::DuplicateLabelSet(_)));
    let status = rule.status();
    assert_eq!(status.health, RuleHealth::Err);
    assert!(status.last_error.unwrap().contains("same labelset"));
}

#[tokio::test]
async fn query_errors_mark_rule_unhealthy() {
    let query = query_fn(|_, _| async {
        Err::<Vec<Sample>, _>(QueryError::Other("backend down".to_string()))
    });
    let rule = RecordingRule::new("job:up", "up", Labels::new());

    assert!(rule.eval(Utc::now(), &query).await.is_err());
    let status = rule.status();
    assert_eq!(status.health, RuleHealth::Err);
    assert_eq!(status.last_error.as_deref(), Some("backend down"));
    assert!(status.timestamp.is_some());
}

#[tokio::test]
async fn recording_rule_renames_series() {
    let query = fixed(vec![Sample::new(labels(&[("__name__", "up"), ("job", "api")]), 1.0)]);
    let rule = RecordingRule::new("job:up", "up", labels(&[("team", "core")]));

    rule.eval(Utc::now(), &query).await.unwrap();

    let out = rule.last_samples();
    assert_eq!(out.len(), 1);
    assert_eq!(
        out[0].metric,
        labels(&[("__name__", "job:up"), ("job", "api"), ("team", "core")])
    );
}

#[tokio::test]
async fn eval_once_updates_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "a.yaml", TWO_GROUPS);
    let registry = Registry::new();
    let engine = Engine::new(PartialResponseStrategy::Warn, fixed(vec![]), &registry).unwrap();

    engine.update(Duration::from_secs(60), &[path]).await.unwrap();
    assert_eq!(engine.eval_once().await, 0);

    let key = engine.rule_groups()[0].key();
    assert_eq!(
        engine.metrics().evaluations_total.with_label_values(&[key.as_str()]).get(),
        2
    );
    let names: Vec<String> = registry.gather().iter().map(|f| f.get_name().to_string()).collect();
    assert!(names.contains(&"rulemux_rule_group_iterations_total".to_string()));
}

#[tokio::test]
async fn engines_for_different_strategies_share_a_registry() {
    let registry = Registry::new();
    let _abort = Engine::new(PartialResponseStrategy::Abort, fixed(vec![]), &registry).unwrap();
    let _warn = Engine::new(PartialResponseStrategy::Warn, fixed(vec![]), &registry).unwrap();
    assert!(Engine::new(PartialResponseStrategy::Warn, fixed(vec![]), &registry).is_err());
}

#[tokio::test]
async fn run_evaluates_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "fast.yaml",
        "groups:\n  - name: fast\n    interval: 10ms\n    rules:\n      - record: r\n        expr: up\n",
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let query = query_fn(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, QueryError>(Vec::<Sample>::new()) }
    });
    let engine = engine(query);

    engine.update(Duration::from_secs(60), &[path]).await.unwrap();
    engine.run().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop().await;

    let seen = calls.load(Ordering::SeqCst);
    assert!(seen >= 2, "expected repeated evaluations, got {seen}");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), seen);
}
