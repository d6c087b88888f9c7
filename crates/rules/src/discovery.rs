//! Expands configured rule paths into the list of rule files to load.

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

/// Whether `path` looks like a rule file: `*.yml` / `*.yaml`, not a dotfile.
pub fn is_rule_file(path: &Path) -> bool {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false);
    is_yaml && !is_hidden(path)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Expand `entries` into a sorted, de-duplicated file list.
///
/// Directories are walked recursively for rule files, skipping dotfiles
/// and dot-directories. Any other entry is taken as a file as-is, so a
/// missing file surfaces as a read error on reload.
pub fn discover_rule_files(entries: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in entries {
        if !entry.is_dir() {
            files.push(entry.clone());
            continue;
        }

        let walker = WalkDir::new(entry)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()));

        for item in walker {
            let item = match item {
                Ok(i) => i,
                Err(e) => {
                    warn!(path = %entry.display(), error = %e, "walkdir error, skipping entry");
                    continue;
                }
            };
            if item.file_type().is_file() && is_rule_file(item.path()) {
                files.push(item.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_directories_and_keeps_explicit_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("team/nested")).unwrap();
        std::fs::create_dir_all(root.join(".hidden")).unwrap();
        for f in ["a.yaml", "team/b.yml", "team/nested/c.yaml", "notes.txt", ".d.yaml", ".hidden/e.yaml"] {
            std::fs::write(root.join(f), "groups: []").unwrap();
        }
        let explicit = root.join("elsewhere.rules");

        let found = discover_rule_files(&[root.to_path_buf(), explicit.clone(), root.join("a.yaml")]);

        let mut expected = vec![
            root.join("a.yaml"),
            root.join("team/b.yml"),
            root.join("team/nested/c.yaml"),
            explicit,
        ];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[test]
    fn rule_file_filter() {
        assert!(is_rule_file(Path::new("/r/x.yaml")));
        assert!(is_rule_file(Path::new("x.yml")));
        assert!(!is_rule_file(Path::new("x.json")));
        assert!(!is_rule_file(Path::new("/r/.x.yaml")));
    }
}
