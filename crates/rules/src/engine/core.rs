use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use prometheus::Registry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::policy::PartialResponseStrategy;
use crate::query::QueryFn;
use crate::schema::{RuleGroup, RuleGroups};

use super::group::Group;
use super::metrics::EngineMetrics;
use super::{EngineError, RuleEngine};

struct GroupLoop {
    group: Arc<Group>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Bundled rule engine for one strategy.
pub struct Engine {
    strategy: PartialResponseStrategy,
    query: QueryFn,
    metrics: EngineMetrics,
    groups: RwLock<Vec<Arc<Group>>>,
    loops: tokio::sync::Mutex<Vec<GroupLoop>>,
    running: AtomicBool,
}

impl Engine {
    pub fn new(
        strategy: PartialResponseStrategy,
        query: QueryFn,
        registry: &Registry,
    ) -> Result<Self, EngineError> {
        Ok(Self {
            strategy,
            query,
            metrics: EngineMetrics::new(strategy, registry)?,
            groups: RwLock::new(Vec::new()),
            loops: tokio::sync::Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    pub fn strategy(&self) -> PartialResponseStrategy {
        self.strategy
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Evaluate every loaded group once, in order. Returns the number of
    /// failed rule evaluations.
    pub async fn eval_once(&self) -> usize {
        let mut failures = 0;
        for group in self.rule_groups() {
            failures += group.eval(&self.query, &self.metrics).await;
        }
        failures
    }

    fn load(path: &Path) -> Result<Vec<RuleGroup>, EngineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let parsed = RuleGroups::from_yaml(&contents).map_err(|e| EngineError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        let errors = parsed.validate();
        if !errors.is_empty() {
            return Err(EngineError::Invalid { path: path.to_path_buf(), errors });
        }
        Ok(parsed.groups)
    }

    fn spawn_loop(&self, group: Arc<Group>) -> GroupLoop {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&group).run(
            self.query.clone(),
            self.metrics.clone(),
            cancel.clone(),
        ));
        GroupLoop { group, cancel, handle }
    }
}

#[async_trait]
impl RuleEngine for Engine {
    fn rule_groups(&self) -> Vec<Arc<Group>> {
        self.groups.read().expect("engine groups lock poisoned").clone()
    }

    async fn update(&self, interval: Duration, files: &[PathBuf]) -> Result<(), EngineError> {
        // Parse everything up front so a bad file leaves the old set loaded.
        let mut defs = Vec::new();
        for path in files {
            for def in Self::load(path)? {
                defs.push((path.as_path(), def));
            }
        }

        let mut loops = self.loops.lock().await;
        let old = self.rule_groups();

        let mut next = Vec::with_capacity(defs.len());
        let mut reused = 0;
        for (path, def) in &defs {
            let existing = old.iter().find(|g| g.matches(def, path, interval));
            let group = match existing {
                Some(g) => {
                    reused += 1;
                    Arc::clone(g)
                }
                None => Arc::new(Group::from_def(def, path, interval, self.strategy)),
            };
            self.metrics.set_group_rules(&group.key(), group.rules().len());
            next.push(group);
        }

        for gone in old.iter().filter(|g| !next.iter().any(|n| Arc::ptr_eq(n, g))) {
            self.metrics.forget_group(&gone.key());
        }

        // Stop loops whose group did not survive.
        let mut kept = Vec::with_capacity(loops.len());
        for lp in loops.drain(..) {
            if next.iter().any(|g| Arc::ptr_eq(g, &lp.group)) {
                kept.push(lp);
            } else {
                lp.cancel.cancel();
                if let Err(e) = lp.handle.await {
                    warn!(group = %lp.group.name(), error = %e, "group loop ended abnormally");
                }
            }
        }
        *loops = kept;

        *self.groups.write().expect("engine groups lock poisoned") = next.clone();

        if self.running.load(Ordering::SeqCst) {
            for group in &next {
                if !loops.iter().any(|lp| Arc::ptr_eq(&lp.group, group)) {
                    let lp = self.spawn_loop(Arc::clone(group));
                    loops.push(lp);
                }
            }
        }

        info!(
            strategy = %self.strategy,
            files = files.len(),
            groups = next.len(),
            reused,
            "rule engine updated"
        );
        Ok(())
    }

    async fn run(&self) {
        let mut loops = self.loops.lock().await;
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for group in self.rule_groups() {
            let lp = self.spawn_loop(group);
            loops.push(lp);
        }
        debug!(strategy = %self.strategy, groups = loops.len(), "rule engine running");
    }

    async fn stop(&self) {
        let mut loops = self.loops.lock().await;
        self.running.store(false, Ordering::SeqCst);
        for lp in loops.iter() {
            lp.cancel.cancel();
        }
        for lp in loops.drain(..) {
            if let Err(e) = lp.handle.await {
                warn!(group = %lp.group.name(), error = %e, "group loop ended abnormally");
            }
        }
        debug!(strategy = %self.strategy, "rule engine stopped");
    }
}
