use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::Group;
use crate::policy::PartialResponseStrategy;

/// Scratch files owned by one strategy, with their source files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyFiles {
    pub files: Vec<PathBuf>,
    pub originals: HashMap<PathBuf, PathBuf>,
}

/// Which scratch files each engine is loaded with, where they came from,
/// and the live groups as of the same reload. Replaced wholesale on reload;
/// readers share an `Arc` snapshot, so a listing never mixes two reloads.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    by_strategy: BTreeMap<PartialResponseStrategy, StrategyFiles>,
    groups: Vec<Arc<Group>>,
}

impl FileIndex {
    /// Source file for a scratch file, if known.
    pub fn original(&self, scratch: &Path) -> Option<&Path> {
        self.by_strategy
            .values()
            .find_map(|s| s.originals.get(scratch))
            .map(PathBuf::as_path)
    }

    /// Source file for a scratch file, or the scratch path itself.
    pub fn display_file<'a>(&'a self, scratch: &'a Path) -> &'a Path {
        self.original(scratch).unwrap_or(scratch)
    }

    pub fn files(&self, strategy: PartialResponseStrategy) -> &[PathBuf] {
        self.by_strategy
            .get(&strategy)
            .map(|s| s.files.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn set(&mut self, strategy: PartialResponseStrategy, files: StrategyFiles) {
        self.by_strategy.insert(strategy, files);
    }

    /// Live groups across every engine, captured at the last reload.
    pub fn groups(&self) -> &[Arc<Group>] {
        &self.groups
    }

    pub(crate) fn set_groups(&mut self, groups: Vec<Arc<Group>>) {
        self.groups = groups;
    }

    /// Every known source file, deduplicated and sorted.
    pub fn sources(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = self
            .by_strategy
            .values()
            .flat_map(|s| s.originals.values().cloned())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}
