//! Instant queries against a Prometheus-compatible HTTP API.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::policy::PartialResponseStrategy;
use crate::schema::Labels;
use crate::wire::parse_value;

use super::{QueryError, QueryFn, Sample};

/// HTTP query client shared by every engine; each engine gets its own
/// [`QueryFn`] via [`HttpQuerier::query_fn`].
pub struct HttpQuerier {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum ApiData {
    Vector(Vec<VectorSample>),
    Scalar((f64, String)),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    metric: Labels,
    value: (f64, String),
}

impl HttpQuerier {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Query function bound to one strategy.
    pub fn query_fn(self: &Arc<Self>, strategy: PartialResponseStrategy) -> QueryFn {
        let this = Arc::clone(self);
        Arc::new(move |query, ts| {
            let this = Arc::clone(&this);
            Box::pin(async move { this.instant_query(&query, ts, strategy).await })
        })
    }

    /// Run one instant query. Partial responses are only requested for
    /// strategies other than ABORT.
    pub async fn instant_query(
        &self,
        query: &str,
        ts: DateTime<Utc>,
        strategy: PartialResponseStrategy,
    ) -> Result<Vec<Sample>, QueryError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let time = format!("{:.3}", ts.timestamp_millis() as f64 / 1000.0);
        let partial = strategy != PartialResponseStrategy::Abort;

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("query", query),
                ("time", time.as_str()),
                ("partial_response", if partial { "true" } else { "false" }),
            ])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(%status, query, "instant query returned");
        decode_response(status.as_u16(), &body, strategy)
    }
}

/// Decode a query API body into samples, applying the strategy to warnings.
pub(crate) fn decode_response(
    status: u16,
    body: &str,
    strategy: PartialResponseStrategy,
) -> Result<Vec<Sample>, QueryError> {
    let resp: ApiResponse = serde_json::from_str(body).map_err(|e| QueryError::Status {
        status,
        message: format!("undecodable body: {e}"),
    })?;

    if resp.status != "success" {
        return Err(QueryError::Api {
            error_type: resp.error_type.unwrap_or_else(|| "unknown".to_string()),
            message: resp.error.unwrap_or_default(),
        });
    }

    if !resp.warnings.is_empty() {
        match strategy {
            PartialResponseStrategy::Abort => return Err(QueryError::Partial(resp.warnings)),
            PartialResponseStrategy::Warn => {
                warn!(warnings = ?resp.warnings, "query returned a partial response")
            }
            PartialResponseStrategy::Ignore => {}
        }
    }

    match resp.data {
        None => Ok(Vec::new()),
        Some(ApiData::Vector(samples)) => samples
            .into_iter()
            .map(|s| {
                let value = parse_value(&s.value.1)
                    .ok_or_else(|| QueryError::InvalidValue(s.value.1.clone()))?;
                Ok(Sample::new(s.metric, value))
            })
            .collect(),
        Some(ApiData::Scalar((_, raw))) => {
            let value = parse_value(&raw).ok_or(QueryError::InvalidValue(raw))?;
            Ok(vec![Sample::new(Labels::new(), value)])
        }
        Some(ApiData::Matrix(_)) => Err(QueryError::UnsupportedResult("matrix".to_string())),
        Some(ApiData::String(_)) => Err(QueryError::UnsupportedResult("string".to_string())),
    }
}
