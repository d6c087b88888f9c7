use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::RuleEngine;
use crate::error::{MultiError, RuleError};

use super::core::Manager;
use super::file_index::StrategyFiles;

impl<E: RuleEngine> Manager<E> {
    /// Reload from `files`, evaluating groups every `eval_interval` unless
    /// a group sets its own interval. Repeated paths are loaded once.
    ///
    /// Every engine is updated, with an empty file list when no file carries
    /// its strategy. Strategies whose engine rejects the update keep their
    /// previous index entries. All recoverable errors of the cycle are
    /// returned together.
    pub async fn update(&self, eval_interval: Duration, files: &[PathBuf]) -> Result<(), MultiError> {
        let _reload = self.reload_lock.lock().await;
        let mut errs = MultiError::new();

        // A path listed twice is loaded once.
        let mut seen: HashSet<&Path> = HashSet::with_capacity(files.len());
        let mut sources = Vec::with_capacity(files.len());
        for path in files.iter().filter(|p| seen.insert(p.as_path())) {
            match tokio::fs::read(path).await {
                Ok(bytes) => sources.push((path.clone(), bytes)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read rule file");
                    errs.push(RuleError::Io { path: path.clone(), source: e });
                }
            }
        }

        let (out, partition_errs) = match self.partitioner.partition(&sources) {
            Ok(res) => res,
            Err(e) => {
                errs.push(e);
                return Err(errs);
            }
        };
        errs.extend(partition_errs);

        for strategy in out.files_by_strategy.keys() {
            if !self.engines.contains_key(strategy) {
                warn!(strategy = %strategy, "no engine for strategy; dropping its files");
                errs.push(RuleError::NoEngine(*strategy));
            }
        }

        let mut next = (*self.file_index()).clone();
        for (strategy, engine) in &self.engines {
            let files = out.files(*strategy).to_vec();
            match engine.update(eval_interval, &files).await {
                Ok(()) => {
                    let originals = files
                        .iter()
                        .filter_map(|f| out.originals.get(f).map(|o| (f.clone(), o.clone())))
                        .collect();
                    next.set(*strategy, StrategyFiles { files, originals });
                }
                Err(source) => {
                    warn!(strategy = %strategy, error = %source, "engine rejected rule files");
                    errs.push(RuleError::Engine { strategy: *strategy, source });
                }
            }
        }

        next.set_groups(self.engines.values().flat_map(|e| e.rule_groups()).collect());
        let groups = next.groups().len();
        *self.index.write().expect("file index lock poisoned") = Arc::new(next);

        info!(
            files = files.len(),
            scratch_files = out.originals.len(),
            groups,
            errors = errs.len(),
            "rules reloaded"
        );
        errs.into_result()
    }
}
