//! Multi-strategy rule orchestration.
//!
//! This crate provides:
//! - Rule-group YAML schema with a per-group `partial_response_strategy` tag
//! - A partitioner that splits rule files into per-strategy scratch files
//! - An engine pool (one evaluation engine per strategy) with atomic reloads
//! - Streaming, filterable listings of live groups and active alerts
//! - Rule file discovery and hot-reload via a `notify` watcher
//! - The HTTP API and query client used by the `rules-worker` binary

pub mod api;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod manager;
pub mod partition;
pub mod policy;
pub mod query;
pub mod schema;
pub mod watch;
pub mod wire;

pub use error::{MultiError, PolicyParseError, Result, RuleError};
pub use manager::Manager;
pub use policy::PartialResponseStrategy;
