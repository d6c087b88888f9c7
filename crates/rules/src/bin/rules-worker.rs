//! rules-worker: evaluates rule groups with one engine per partial
//! response strategy and serves their state over HTTP.
//!
//! Rule files are re-read whenever they change on disk. `--check` only
//! partitions and validates the configured files, then exits.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use rulemux_core::config::load_dotenv;
use rulemux_core::{format_duration, parse_duration, Config};
use rulemux_rules::api::{router, ApiState};
use rulemux_rules::discovery::discover_rule_files;
use rulemux_rules::partition::Partitioner;
use rulemux_rules::query::HttpQuerier;
use rulemux_rules::schema::RuleGroups;
use rulemux_rules::watch::RuleWatcher;
use rulemux_rules::Manager;

/// Quiet period after a file change before reloading.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

// ── CLI ─────────────────────────────────────────────────────────────

/// Multi-strategy rule evaluation worker.
#[derive(Parser, Debug)]
#[command(name = "rules-worker", version, about)]
struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first.
    #[arg(long, env = "RULEMUX_PROFILE", default_value = "")]
    profile: String,

    /// Data directory; the scratch directory lives under it.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Rule file or directory (repeatable). Replaces RULE_FILES.
    #[arg(long = "rule-file")]
    rule_files: Vec<PathBuf>,

    /// Default group evaluation interval, e.g. `30s`, `1m`.
    #[arg(long, value_parser = parse_duration)]
    eval_interval: Option<Duration>,

    /// Base URL of the Prometheus-compatible query API.
    #[arg(long)]
    query_url: Option<String>,

    /// Query timeout.
    #[arg(long, value_parser = parse_duration)]
    query_timeout: Option<Duration>,

    /// HTTP listen address.
    #[arg(long)]
    listen: Option<String>,

    /// Partition and validate the rule files, then exit.
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::for_profile(&self.profile);
        if let Some(dir) = &self.data_dir {
            config.rules.data_dir = dir.clone();
        }
        if !self.rule_files.is_empty() {
            config.rules.rule_files = self.rule_files.clone();
        }
        if let Some(interval) = self.eval_interval {
            config.rules.eval_interval = interval;
        }
        if let Some(url) = &self.query_url {
            config.query.url = url.clone();
        }
        if let Some(timeout) = self.query_timeout {
            config.query.timeout = timeout;
        }
        if let Some(addr) = &self.listen {
            config.server.listen_addr = addr.clone();
        }
        config
    }
}

// ── Check mode ──────────────────────────────────────────────────────

/// Partition every file into a temporary directory and validate each
/// generated file. Returns whether all files passed.
fn check(files: &[PathBuf]) -> anyhow::Result<bool> {
    let scratch = tempfile::tempdir().context("creating scratch directory")?;
    let parts = Partitioner::new(scratch.path());
    let mut ok = true;

    for path in files {
        match check_file(&parts, path) {
            Ok(summary) => println!("OK    {}: {}", path.display(), summary),
            Err(e) => {
                ok = false;
                println!("FAIL  {}: {:#}", path.display(), e);
            }
        }
    }
    Ok(ok)
}

fn check_file(parts: &Partitioner, path: &Path) -> anyhow::Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let (written, errs) = parts.partition_file(path, &bytes)?;
    errs.into_result()?;

    let mut summary = Vec::new();
    for (strategy, scratch) in written {
        let contents = std::fs::read_to_string(&scratch)?;
        let groups = RuleGroups::from_yaml(&contents)?;
        let problems = groups.validate();
        if !problems.is_empty() {
            anyhow::bail!("{}: {}", strategy, problems.join("; "));
        }
        summary.push(format!("{}={}", strategy, groups.groups.len()));
    }
    if summary.is_empty() {
        return Ok("no groups".to_string());
    }
    Ok(format!("groups {}", summary.join(" ")))
}

// ── Reload ──────────────────────────────────────────────────────────

async fn reload(manager: &Manager, config: &Config) {
    let files = discover_rule_files(&config.rules.rule_files);
    match manager.update(config.rules.eval_interval, &files).await {
        Ok(()) => info!(files = files.len(), "rules loaded"),
        Err(errs) => {
            for e in errs {
                warn!(error = %e, "rule reload error");
            }
        }
    }
}

/// Reload on every watcher signal, after a quiet period.
async fn reload_loop(manager: Arc<Manager>, config: Config, mut rx: mpsc::Receiver<()>) {
    while rx.recv().await.is_some() {
        tokio::time::sleep(RELOAD_DEBOUNCE).await;
        while rx.try_recv().is_ok() {}
        info!("rule files changed, reloading");
        reload(&manager, &config).await;
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "failed to register SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = ctrl_c.await {
            warn!(error = %e, "failed to listen for ctrl_c");
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = cli.config();
    config.log_summary();

    if cli.check {
        let files = discover_rule_files(&config.rules.rule_files);
        let ok = check(&files)?;
        return Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    let registry = Registry::new();
    let querier = Arc::new(
        HttpQuerier::new(config.query.url.clone(), config.query.timeout)
            .context("building query client")?,
    );
    let manager = Arc::new(Manager::new(&config.rules.data_dir, &registry, |strategy| {
        querier.query_fn(strategy)
    })?);

    reload(&manager, &config).await;
    manager.run().await;

    let (reload_tx, reload_rx) = mpsc::channel(1);
    let _watcher = match RuleWatcher::spawn(&config.rules.rule_files, reload_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!(error = %e, "rule file watcher unavailable, hot-reload disabled");
            None
        }
    };
    tokio::spawn(reload_loop(Arc::clone(&manager), config.clone(), reload_rx));

    let app = router(Arc::new(ApiState::new(Arc::clone(&manager), registry)));
    let listener = tokio::net::TcpListener::bind(&config.server.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.server.listen_addr))?;
    info!(
        addr = %config.server.listen_addr,
        eval_interval = %format_duration(config.rules.eval_interval),
        "rules-worker listening"
    );

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "HTTP server failed");
    }

    manager.stop().await;
    info!("rules-worker exited cleanly");
    Ok(ExitCode::SUCCESS)
}
