//! HTTP API of the rules worker.
//!
//! - `GET /api/v1/rules?type=all|alert|record`: newline-delimited JSON, one
//!   `{"group": ...}` object per line
//! - `GET /api/v1/alerts`: every active alert instance
//! - `GET /metrics`: Prometheus text exposition

use std::any::Any;
use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::engine::{Engine, RuleEngine};
use crate::error::RuleError;
use crate::manager::{ChannelSink, Manager, RuleType, RulesRequest, RulesResponse};

const NDJSON: &str = "application/x-ndjson";

/// Shared state of the HTTP handlers.
pub struct ApiState<E: RuleEngine = Engine> {
    pub manager: Arc<Manager<E>>,
    pub registry: Registry,
}

impl<E: RuleEngine> ApiState<E> {
    pub fn new(manager: Arc<Manager<E>>, registry: Registry) -> Self {
        Self { manager, registry }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RulesParams {
    #[serde(rename = "type", default)]
    pub rule_type: Option<String>,
}

/// Build the worker router.
pub fn router<E: RuleEngine>(state: Arc<ApiState<E>>) -> Router {
    Router::new()
        .route("/api/v1/rules", get(list_rules::<E>))
        .route("/api/v1/alerts", get(list_alerts::<E>))
        .route("/metrics", get(metrics::<E>))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({ "status": "error", "error": message.into() });
    (status, Json(body)).into_response()
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "rules listing panicked".to_string()
    }
}

fn ndjson_line(resp: &RulesResponse) -> io::Result<Bytes> {
    let mut buf = serde_json::to_vec(resp)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

fn ndjson_response(body: Body) -> Response {
    ([(header::CONTENT_TYPE, NDJSON)], body).into_response()
}

async fn list_rules<E: RuleEngine>(
    State(state): State<Arc<ApiState<E>>>,
    Query(params): Query<RulesParams>,
) -> Response {
    let rule_type = match params.rule_type.as_deref().unwrap_or("all").parse::<RuleType>() {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    let (tx, mut rx) = mpsc::channel::<RulesResponse>(16);
    let cancel = CancellationToken::new();
    let task = tokio::spawn({
        let manager = Arc::clone(&state.manager);
        let cancel = cancel.clone();
        async move {
            let mut sink = ChannelSink::new(tx);
            manager.rules(RulesRequest::new(rule_type), &mut sink, &cancel).await
        }
    });

    // Hold the status line until the first group is out, so a failure
    // before any output can still be reported as a 500.
    let Some(first) = rx.recv().await else {
        return match task.await {
            Ok(Ok(())) => ndjson_response(Body::empty()),
            Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            Err(e) => {
                let msg = panic_message(e);
                error!(error = %msg, "rules listing panicked");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
    };

    // Dropping the body (client gone) cancels the listing.
    let guard = cancel.drop_guard();
    let tail = futures::stream::once(async move {
        let _guard = guard;
        match task.await {
            Ok(Ok(())) | Ok(Err(RuleError::Cancelled)) => None,
            Ok(Err(e)) => {
                warn!(error = %e, "rules listing failed mid-stream");
                Some(Err(io::Error::new(io::ErrorKind::Other, e.to_string())))
            }
            Err(e) => {
                let msg = panic_message(e);
                error!(error = %msg, "rules listing panicked mid-stream");
                Some(Err(io::Error::new(io::ErrorKind::Other, msg)))
            }
        }
    })
    .filter_map(|item| async move { item });

    let lines = futures::stream::once(async move { first })
        .chain(ReceiverStream::new(rx))
        .map(|resp| ndjson_line(&resp))
        .chain(tail);

    ndjson_response(Body::from_stream(lines))
}

async fn list_alerts<E: RuleEngine>(State(state): State<Arc<ApiState<E>>>) -> Response {
    Json(json!({ "alerts": state.manager.active_alerts() })).into_response()
}

async fn metrics<E: RuleEngine>(State(state): State<Arc<ApiState<E>>>) -> Response {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buf) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buf,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::Request;
    use chrono::{DateTime, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::engine::{AlertingRule, EngineError, EvalError, EvalStatus, Group, Rule};
    use crate::policy::PartialResponseStrategy;
    use crate::query::{query_fn, QueryError, QueryFn, Sample};
    use crate::schema::Labels;
    use crate::wire::WireGroup;

    use super::*;

    fn no_samples(_: PartialResponseStrategy) -> QueryFn {
        query_fn(|_, _| async { Ok::<_, QueryError>(Vec::<Sample>::new()) })
    }

    async fn state_with(files: &[(&str, &str)], dir: &tempfile::TempDir) -> Arc<ApiState> {
        let registry = Registry::new();
        let manager = Manager::new(dir.path().join("data"), &registry, no_samples).unwrap();
        let mut paths = Vec::new();
        for (name, contents) in files {
            let p = dir.path().join(name);
            std::fs::write(&p, contents).unwrap();
            paths.push(p);
        }
        manager.update(Duration::from_secs(60), &paths).await.unwrap();
        Arc::new(ApiState::new(Arc::new(manager), registry))
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    const FILE: &str = "groups:
  - name: mixed
    partial_response_strategy: warn
    rules:
      - alert: Down
        expr: up == 0
      - record: job:up
        expr: sum(up)
";

    fn parse_lines(body: &str) -> Vec<WireGroup> {
        body.lines()
            .map(|l| match serde_json::from_str::<RulesResponse>(l).unwrap() {
                RulesResponse::Group(g) => g,
            })
            .collect()
    }

    #[tokio::test]
    async fn rules_are_streamed_as_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(&[("a.yaml", FILE)], &dir).await);

        let (status, body) = get_body(app.clone(), "/api/v1/rules").await;
        assert_eq!(status, StatusCode::OK);
        let groups = parse_lines(&body);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rules.len(), 2);
        assert_eq!(groups[0].partial_response_strategy, PartialResponseStrategy::Warn);
        assert!(groups[0].file.ends_with("a.yaml"));

        let (_, body) = get_body(app, "/api/v1/rules?type=record").await;
        let groups = parse_lines(&body);
        assert_eq!(groups[0].rules.len(), 1);
        assert!(groups[0].rules[0].is_recording());
    }

    #[tokio::test]
    async fn no_groups_is_an_empty_ok_body() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(&[], &dir).await);
        let (status, body) = get_body(app, "/api/v1/rules?type=alert").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn invalid_rule_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(&[], &dir).await);
        let (status, body) = get_body(app, "/api/v1/rules?type=bogus").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid rule type"));
    }

    #[tokio::test]
    async fn alerts_and_metrics_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(state_with(&[("a.yaml", FILE)], &dir).await);

        let (status, body) = get_body(app.clone(), "/api/v1/alerts").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(json["alerts"].as_array().unwrap().is_empty());

        let (status, body) = get_body(app, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("rulemux_rule_group_rules"));
        assert!(body.contains("strategy=\"warn\""));
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

    /// Engine serving a fixed group set.
    struct StaticEngine(Vec<Arc<Group>>);

    #[async_trait]
    impl RuleEngine for StaticEngine {
        fn rule_groups(&self) -> Vec<Arc<Group>> {
            self.0.clone()
        }
        fn alerting_rules(&self) -> Vec<Arc<AlertingRule>> {
            Vec::new()
        }
        async fn update(&self, _: Duration, _: &[PathBuf]) -> Result<(), EngineError> {
            Ok(())
        }
        async fn run(&self) {}
        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn projection_panic_becomes_500() {
        let dir = tempfile::tempdir().unwrap();
        let group = Group::new(
            "odd",
            "/scratch/odd.yaml",
            Duration::from_secs(1),
            PartialResponseStrategy::Abort,
            vec![Arc::new(Opaque) as Arc<dyn Rule>],
        );
        let engines = BTreeMap::from([(
            PartialResponseStrategy::Abort,
            Arc::new(StaticEngine(vec![Arc::new(group)])),
        )]);
        let manager = Manager::with_engines(dir.path(), engines);
        manager.update(Duration::from_secs(60), &[]).await.unwrap();
        let app = router(Arc::new(ApiState::new(Arc::new(manager), Registry::new())));

        let (status, body) = get_body(app, "/api/v1/rules").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("unsupported type"));
    }
}
