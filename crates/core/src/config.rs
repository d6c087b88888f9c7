use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{format_duration, parse_duration};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

/// Duration-valued env var. Unparseable values are logged and replaced by the default.
fn profiled_env_duration(profile: &str, key: &str, default: &str) -> Duration {
    let fallback = parse_duration(default).unwrap_or_default();
    match profiled_env_opt(profile, key) {
        Some(raw) => parse_duration(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, default, "ignoring invalid duration");
            fallback
        }),
        None => fallback,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub rules: RulesConfig,
    pub query: QueryConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// When `profile` is set (e.g. `PROD`), every key is first looked up as
    /// `{PROFILE}_{KEY}`, falling back to `{KEY}`. Empty means default.
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            rules: RulesConfig::from_env_profiled(p),
            query: QueryConfig::from_env_profiled(p),
            server: ServerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  rules:   data_dir={}, files={}, eval_interval={}",
            self.rules.data_dir.display(),
            self.rules.rule_files.len(),
            format_duration(self.rules.eval_interval)
        );
        tracing::info!(
            "  query:   url={}, timeout={}",
            self.query.url,
            format_duration(self.query.timeout)
        );
        tracing::info!("  server:  listen={}", self.server.listen_addr);
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Working directory; the orchestrator owns `<data_dir>/.tmp-rules`.
    pub data_dir: PathBuf,
    /// Rule files or directories containing them.
    pub rule_files: Vec<PathBuf>,
    /// Interval used by groups that do not set their own.
    pub eval_interval: Duration,
}

impl RulesConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "RULES_DATA_DIR", "data")),
            rule_files: split_list(&profiled_env_or(p, "RULE_FILES", "data/rules"))
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            eval_interval: profiled_env_duration(p, "RULES_EVAL_INTERVAL", "1m"),
        }
    }
}

// ── Query backend ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Base URL of a Prometheus-compatible query API.
    pub url: String,
    pub timeout: Duration,
}

impl QueryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "RULES_QUERY_URL", "http://localhost:9090"),
            timeout: profiled_env_duration(p, "RULES_QUERY_TIMEOUT", "2m"),
        }
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            listen_addr: profiled_env_or(p, "RULES_LISTEN_ADDR", "0.0.0.0:10902"),
        }
    }
}
