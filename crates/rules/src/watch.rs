//! Filesystem watcher that signals rule reloads (hot-reload).

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::discovery::is_rule_file;
use crate::error::Result;

/// Watches configured rule paths and sends a unit signal when a rule file
/// changes. Signals are coalesced: while one is pending, further events are
/// dropped.
pub struct RuleWatcher {
    _watcher: RecommendedWatcher,
}

/// Configured entries split into watched directories and single files.
#[derive(Debug, Clone, Default)]
struct Targets {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl Targets {
    fn from_entries(entries: &[PathBuf]) -> Self {
        let mut targets = Self::default();
        for entry in entries {
            if entry.is_dir() {
                targets.dirs.push(entry.clone());
            } else {
                targets.files.push(entry.clone());
            }
        }
        targets
    }

    fn covers(&self, path: &Path) -> bool {
        if self.files.iter().any(|f| f == path) {
            return true;
        }
        is_rule_file(path) && self.dirs.iter().any(|d| path.starts_with(d))
    }
}

/// Whether an event kind can change the rule set.
fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
            | EventKind::Remove(RemoveKind::File | RemoveKind::Any)
    )
}

fn handle_fs_event(event: &Event, targets: &Targets, tx: &mpsc::Sender<()>) {
    if !is_relevant(&event.kind) {
        return;
    }
    let Some(path) = event.paths.iter().find(|p| targets.covers(p)) else {
        return;
    };
    debug!(path = %path.display(), kind = ?event.kind, "rule file changed");
    // Full channel means a reload is already pending.
    let _ = tx.try_send(());
}

impl RuleWatcher {
    /// Start watching `entries`. Directories are watched recursively; for
    /// single files the parent directory is watched so editor renames are
    /// seen.
    pub fn spawn(entries: &[PathBuf], tx: mpsc::Sender<()>) -> Result<Self> {
        let targets = Targets::from_entries(entries);
        let handler_targets = targets.clone();

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            match res {
                Ok(event) => handle_fs_event(&event, &handler_targets, &tx),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        for dir in &targets.dirs {
            watcher.watch(dir, RecursiveMode::Recursive)?;
            info!(path = %dir.display(), "watching rules directory for changes (recursive)");
        }
        for file in &targets.files {
            let parent = match file.parent() {
                Some(p) if !p.as_os_str().is_empty() => p,
                _ => Path::new("."),
            };
            if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
                warn!(path = %file.display(), error = %e, "cannot watch rule file");
            }
        }

        Ok(Self { _watcher: watcher })
    }
}
