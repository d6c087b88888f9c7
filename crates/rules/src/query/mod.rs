//! Query function seam between the evaluation engines and a query backend.
//!
//! Each engine is bound to one [`QueryFn`] at construction; the orchestrator
//! asks the caller for one per partial response strategy.

mod http;

pub use self::http::HttpQuerier;

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::schema::Labels;

/// One element of an instant-query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Labels,
    pub value: f64,
}

impl Sample {
    pub fn new(metric: Labels, value: f64) -> Self {
        Self { metric, value }
    }
}

/// Errors produced by a query function.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query API returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("query failed ({error_type}): {message}")]
    Api { error_type: String, message: String },

    #[error("partial response rejected: {}", .0.join("; "))]
    Partial(Vec<String>),

    #[error("unsupported result type {0:?}")]
    UnsupportedResult(String),

    #[error("invalid sample value {0:?}")]
    InvalidValue(String),

    #[error("{0}")]
    Other(String),
}

/// Boxed future returned by a [`QueryFn`].
pub type QueryFuture = BoxFuture<'static, Result<Vec<Sample>, QueryError>>;

/// Runs an instant query at the given evaluation time.
pub type QueryFn = Arc<dyn Fn(String, DateTime<Utc>) -> QueryFuture + Send + Sync>;

/// Wrap an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(String, DateTime<Utc>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<Sample>, QueryError>> + Send + 'static,
{
    Arc::new(move |query, ts| Box::pin(f(query, ts)))
}
