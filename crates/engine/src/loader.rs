//! Suite document loading and file location rules

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Reads a suite file into an untyped document
#[async_trait]
pub trait SuiteLoader: Send + Sync {
    /// Fails with `FileDoesNotExist` or `YAMLSuiteLoadingError`
    async fn load(&self, path: &Path) -> Result<Value>;
}

/// Loads YAML suite files from disk
#[derive(Debug, Clone, Default)]
pub struct YamlLoader;

impl YamlLoader {
    /// Parse a suite document from YAML text
    pub fn from_yaml(file: &Path, yaml: &str) -> Result<Value> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::SuiteLoading(format!("({}) \n {}", file.display(), e)))
    }
}

#[async_trait]
impl SuiteLoader for YamlLoader {
    async fn load(&self, path: &Path) -> Result<Value> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(Error::FileDoesNotExist(format!(
                "Test suite file doesn't exist at '{}'",
                path.display()
            )));
        }

        debug!("Loading suite file {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::SuiteLoading(format!("({}) \n {}", path.display(), e)))?;
        Self::from_yaml(path, &content)
    }
}

/// Resolves files referenced from a suite document.
///
/// With `locate_files_relative` paths resolve against the suite's own
/// directory, otherwise against the process working directory.
#[derive(Debug, Clone)]
pub struct FileLocator {
    base: Option<PathBuf>,
}

impl FileLocator {
    pub fn for_suite(suite_file: &Path, relative_to_suite: bool) -> Self {
        let base = relative_to_suite.then(|| {
            suite_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        });
        Self { base }
    }

    /// Working-directory resolution
    pub fn cwd() -> Self {
        Self { base: None }
    }

    pub fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.base {
            Some(dir) => dir.join(path),
            None => std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf()),
        }
    }
}

/// Require `path` to exist and be a regular file.
pub fn assert_file_validity(path: &Path, what: &str) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(Error::NotAFile(format!(
            "{what} at '{}' is not a file, provide a valid file path",
            path.display()
        ))),
        Err(_) => Err(Error::FileDoesNotExist(format!(
            "{what} file at '{}' does not exist, provide a valid path",
            path.display()
        ))),
    }
}
