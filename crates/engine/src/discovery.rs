//! Suite file discovery

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// Outcome of expanding user-supplied paths
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Suite files in argument order, without duplicates
    pub files: Vec<PathBuf>,
    /// Arguments that matched nothing
    pub missing: Vec<PathBuf>,
}

/// Expand files, directories and bare names into suite files.
///
/// Directories yield their non-hidden `*.yml`/`*.yaml` files, descending
/// into subdirectories only when `recursive` is set. A path that does not
/// exist is retried with each suite extension appended.
pub fn discover(paths: &[PathBuf], recursive: bool) -> Discovery {
    let mut discovery = Discovery::default();

    for path in paths {
        let found = expand(path, recursive);
        if found.is_empty() {
            warn!("No suites found using path {}", path.display());
            discovery.missing.push(path.clone());
        }
        for file in found {
            if !discovery.files.contains(&file) {
                discovery.files.push(file);
            }
        }
    }

    discovery
}

fn expand(path: &Path, recursive: bool) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }

    if path.is_dir() {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && has_suite_extension(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        return files;
    }

    EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{}.{}", path.display(), ext)))
        .find(|candidate| candidate.is_file())
        .into_iter()
        .collect()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn has_suite_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| EXTENSIONS.iter().any(|e| ext == *e))
        .unwrap_or(false)
}
