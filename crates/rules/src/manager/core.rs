use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use prometheus::Registry;
use tracing::info;

use crate::engine::{AlertingRule, Engine, Group, RuleEngine};
use crate::error::{Result, RuleError};
use crate::partition::Partitioner;
use crate::policy::PartialResponseStrategy;
use crate::query::QueryFn;
use crate::wire::{self, WireAlertInstance, WireGroup};

use super::file_index::FileIndex;

/// Scratch directory name under the data dir.
pub const SCRATCH_DIR: &str = ".tmp-rules";

/// Owns the engine pool, the scratch directory and the file index.
pub struct Manager<E: RuleEngine = Engine> {
    pub(super) partitioner: Partitioner,
    pub(super) engines: BTreeMap<PartialResponseStrategy, Arc<E>>,
    pub(super) index: RwLock<Arc<FileIndex>>,
    pub(super) reload_lock: tokio::sync::Mutex<()>,
}

impl Manager<Engine> {
    /// Build a manager with one bundled [`Engine`] per strategy, all
    /// registering metrics on `registry`. `query_for` supplies each
    /// engine's query function.
    pub fn new(
        data_dir: impl AsRef<Path>,
        registry: &Registry,
        query_for: impl Fn(PartialResponseStrategy) -> QueryFn,
    ) -> Result<Self> {
        let mut engines = BTreeMap::new();
        for strategy in PartialResponseStrategy::ALL {
            let engine = Engine::new(strategy, query_for(strategy), registry)
                .map_err(|source| RuleError::Engine { strategy, source })?;
            engines.insert(strategy, Arc::new(engine));
        }
        Ok(Self::with_engines(data_dir, engines))
    }
}

impl<E: RuleEngine> Manager<E> {
    /// Build a manager over caller-provided engines.
    pub fn with_engines(
        data_dir: impl AsRef<Path>,
        engines: BTreeMap<PartialResponseStrategy, Arc<E>>,
    ) -> Self {
        Self {
            partitioner: Partitioner::new(data_dir.as_ref().join(SCRATCH_DIR)),
            engines,
            index: RwLock::new(Arc::new(FileIndex::default())),
            reload_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn work_dir(&self) -> &Path {
        self.partitioner.work_dir()
    }

    pub fn engine(&self, strategy: PartialResponseStrategy) -> Option<&Arc<E>> {
        self.engines.get(&strategy)
    }

    /// Snapshot of the current file index.
    pub fn file_index(&self) -> Arc<FileIndex> {
        Arc::clone(&self.index.read().expect("file index lock poisoned"))
    }

    /// Source file a live group was loaded from.
    pub fn source_file(&self, group: &Group) -> PathBuf {
        self.file_index().display_file(group.file()).to_path_buf()
    }

    /// Start every engine's background evaluation.
    pub async fn run(&self) {
        join_all(self.engines.values().map(|e| e.run())).await;
        info!(engines = self.engines.len(), "rule engines started");
    }

    /// Stop every engine and wait until all of them have quiesced.
    pub async fn stop(&self) {
        join_all(self.engines.values().map(|e| e.stop())).await;
        info!(engines = self.engines.len(), "rule engines stopped");
    }

    /// Every live group across all engines, as of the last reload.
    pub fn rule_groups(&self) -> Vec<Arc<Group>> {
        self.file_index().groups().to_vec()
    }

    /// Every live group projected to its output form.
    pub fn wire_groups(&self) -> Vec<WireGroup> {
        let index = self.file_index();
        index
            .groups()
            .iter()
            .map(|g| wire::project_group(g, index.display_file(g.file())))
            .collect()
    }

    /// Every alerting rule, tagged with the strategy of its group.
    pub fn alerting_rules(&self) -> Vec<(PartialResponseStrategy, Arc<AlertingRule>)> {
        self.rule_groups()
            .iter()
            .flat_map(|g| {
                let strategy = g.strategy();
                g.alerting_rules().into_iter().map(move |r| (strategy, r))
            })
            .collect()
    }

    /// Active alert instances across every engine.
    pub fn active_alerts(&self) -> Vec<WireAlertInstance> {
        self.alerting_rules()
            .iter()
            .flat_map(|(strategy, rule)| wire::active_alerts(rule, *strategy))
            .collect()
    }
}
