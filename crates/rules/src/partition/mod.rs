//! Splits user rule files into per-strategy scratch files.
//!
//! Each source file is parsed with the policy-tagged schema, its groups are
//! bucketed by resolved [`PartialResponseStrategy`] (keeping their order),
//! and every non-empty bucket is written, policy tag stripped, to
//! `<scratch>/<base name>.<sha256 of source path>.<STRATEGY>`.


use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{MultiError, PolicyParseError, RuleError};
use crate::policy::PartialResponseStrategy;
use crate::schema::{ConfigRuleGroups, RuleGroup, RuleGroups};

/// Result of partitioning a batch of files.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartitionOutput {
    /// Scratch files per strategy, in source file order.
    pub files_by_strategy: BTreeMap<PartialResponseStrategy, Vec<PathBuf>>,
    /// Scratch file → source file.
    pub originals: HashMap<PathBuf, PathBuf>,
}

impl PartitionOutput {
    pub fn files(&self, strategy: PartialResponseStrategy) -> &[PathBuf] {
        self.files_by_strategy
            .get(&strategy)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Writes per-strategy rule files into a scratch directory it owns.
#[derive(Debug, Clone)]
pub struct Partitioner {
    work_dir: PathBuf,
}

/// Scratch file name for `source` under `strategy`. Stable across runs.
pub fn scratch_name(source: &Path, strategy: PartialResponseStrategy) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let digest = Sha256::digest(source.to_string_lossy().as_bytes());
    format!("{}.{}.{}", base, hex::encode(digest), strategy.as_str())
}

/// Parse one source file and bucket its groups by strategy.
pub fn split_groups(
    path: &Path,
    contents: &[u8],
) -> Result<BTreeMap<PartialResponseStrategy, Vec<RuleGroup>>, RuleError> {
    let parsed = ConfigRuleGroups::from_slice(contents).map_err(|e| RuleError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut buckets: BTreeMap<PartialResponseStrategy, Vec<RuleGroup>> = BTreeMap::new();
    for group in parsed.groups {
        let (group, tag) = group.into_parts();
        let strategy = PartialResponseStrategy::resolve(tag.as_deref()).map_err(|value| {
            PolicyParseError {
                file: path.to_path_buf(),
                group: group.name.clone(),
                value,
            }
        })?;
        buckets.entry(strategy).or_default().push(group);
    }
    Ok(buckets)
}

impl Partitioner {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self { work_dir: work_dir.into() }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Recreate the scratch directory and partition every source.
    ///
    /// A failing file is skipped; its error is collected and the rest are
    /// still written. The output holds whatever succeeded. Only an unusable
    /// scratch directory fails the whole batch.
    pub fn partition(
        &self,
        sources: &[(PathBuf, Vec<u8>)],
    ) -> Result<(PartitionOutput, MultiError), RuleError> {
        self.reset_work_dir()?;

        let mut out = PartitionOutput::default();
        let mut errs = MultiError::new();

        for (path, contents) in sources {
            match self.partition_file(path, contents) {
                Ok((written, bucket_errs)) => {
                    for (strategy, scratch) in written {
                        out.originals.insert(scratch.clone(), path.clone());
                        out.files_by_strategy.entry(strategy).or_default().push(scratch);
                    }
                    for e in bucket_errs.errors() {
                        warn!(path = %path.display(), error = %e, "skipping rule file bucket");
                    }
                    errs.extend(bucket_errs);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping rule file");
                    errs.push(e);
                }
            }
        }

        debug!(
            sources = sources.len(),
            written = out.originals.len(),
            failed = errs.len(),
            "rule files partitioned"
        );
        Ok((out, errs))
    }

    /// Partition one source into the (existing) scratch directory.
    ///
    /// A source that does not parse fails as a whole. Otherwise each
    /// strategy bucket is written on its own: the buckets that were written
    /// are returned next to the errors of those that were not.
    pub fn partition_file(
        &self,
        path: &Path,
        contents: &[u8],
    ) -> Result<(Vec<(PartialResponseStrategy, PathBuf)>, MultiError), RuleError> {
        let buckets = split_groups(path, contents)?;

        let mut written = Vec::with_capacity(buckets.len());
        let mut errs = MultiError::new();
        for (strategy, groups) in buckets {
            let scratch = self.work_dir.join(scratch_name(path, strategy));
            match write_bucket(&scratch, groups) {
                Ok(()) => written.push((strategy, scratch)),
                Err(e) => errs.push(e),
            }
        }
        Ok((written, errs))
    }

    fn reset_work_dir(&self) -> Result<(), RuleError> {
        match std::fs::remove_dir_all(&self.work_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(RuleError::Io { path: self.work_dir.clone(), source: e });
            }
        }
        std::fs::create_dir_all(&self.work_dir).map_err(|e| RuleError::Io {
            path: self.work_dir.clone(),
            source: e,
        })
    }
}

fn write_bucket(scratch: &Path, groups: Vec<RuleGroup>) -> Result<(), RuleError> {
    let body = serde_yaml::to_string(&RuleGroups { groups }).map_err(|e| RuleError::Marshal {
        path: scratch.to_path_buf(),
        source: e,
    })?;
    std::fs::write(scratch, body).map_err(|e| RuleError::Io {
        path: scratch.to_path_buf(),
        source: e,
    })
}
