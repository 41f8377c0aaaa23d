//! Spec sources and dependency suites
//!
//! A dependency suite goes through the same load, validate and configure
//! stages as a scheduled suite but is never run on its own. Its specs are
//! only reachable through `run_spec` from the depending suite.

use specline_common::document::{SpecDefinition, SuiteDocument, TargetConfiguration};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::context::Toolkit;
use crate::error::{occurred_while, Error, Result};
use crate::loader::{assert_file_validity, FileLocator};
use crate::suite::{load_stage, validate_stage};
use crate::target::{header_map, resolve_target};

/// A configured suite document whose specs can be executed
#[derive(Debug, Clone)]
pub struct SpecSource {
    pub file: PathBuf,
    pub document: Arc<SuiteDocument>,
    pub target: TargetConfiguration,
    pub common_headers: BTreeMap<String, String>,
    pub locator: FileLocator,
}

impl SpecSource {
    pub fn new(
        file: PathBuf,
        document: Arc<SuiteDocument>,
        target: TargetConfiguration,
        locator: FileLocator,
    ) -> Self {
        let common_headers = header_map(&document.configuration.common_headers);
        Self {
            file,
            document,
            target,
            common_headers,
            locator,
        }
    }

    pub fn spec(&self, name: &str) -> Option<&SpecDefinition> {
        self.document.spec(name)
    }

    /// Load, validate and configure a dependency suite
    pub async fn load_dependency(toolkit: &Toolkit, file: &Path) -> Result<Self> {
        assert_file_validity(file, "Dependency suite")?;

        let raw = load_stage(toolkit, file).await?;
        let document = validate_stage(toolkit, file, raw)?;
        let locator = FileLocator::for_suite(file, document.meta.locate_files_relative);
        let target =
            resolve_target(toolkit, file, &document.configuration, &locator).await?;

        Ok(Self::new(file.to_path_buf(), Arc::new(document), target, locator))
    }
}

/// Load every declared dependency; any failure fails the whole set.
pub async fn load_dependencies(
    toolkit: &Toolkit,
    document: &SuiteDocument,
    locator: &FileLocator,
) -> Result<Vec<Arc<SpecSource>>> {
    let mut loaded = Vec::with_capacity(document.spec_dependencies.len());

    for reference in &document.spec_dependencies {
        let file = locator.resolve(reference);
        debug!("Loading dependency suite {}", file.display());

        let dependency = SpecSource::load_dependency(toolkit, &file)
            .await
            .map_err(|err| {
                Error::LoadingSpecDependencySuite(occurred_while(
                    err.kind(),
                    &format!("loading dependency suite '{}'", file.display()),
                    &err,
                ))
            })?;
        loaded.push(Arc::new(dependency));
    }

    Ok(loaded)
}
