//! JSON file reporter

use chrono::{DateTime, Utc};
use serde::Serialize;
use specline_common::event::RunEvent;
use specline_common::result::{RunSummary, SuiteReport};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::Reporter;

pub const DIR_OPTION: &str = "jsonReportDir";
pub const NAME_OPTION: &str = "jsonReportName";

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    summary: &'a RunSummary,
    suites: &'a [Arc<SuiteReport>],
}

/// Writes `{dir}/{name}.json` once the run ends
pub struct JsonReporter {
    dir: PathBuf,
    name: String,
    run_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    suites: Vec<Arc<SuiteReport>>,
}

impl JsonReporter {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            name: name.into(),
            run_id: None,
            started_at: None,
            suites: Vec::new(),
        }
    }

    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        Self::new(
            options.get(DIR_OPTION).map(String::as_str).unwrap_or("."),
            options
                .get(NAME_OPTION)
                .map(String::as_str)
                .unwrap_or("specline-report"),
        )
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    fn write(&mut self, summary: &RunSummary) -> anyhow::Result<()> {
        self.suites.sort_by_key(|s| s.suite.index);
        let report = JsonReport {
            run_id: self.run_id,
            started_at: self.started_at,
            summary,
            suites: &self.suites,
        };

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path();
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
        info!("JSON report written to {}", path.display());
        Ok(())
    }
}

impl Reporter for JsonReporter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn on_event(&mut self, event: &RunEvent) -> anyhow::Result<()> {
        match event {
            RunEvent::RunStart {
                run_id, started_at, ..
            } => {
                self.run_id = Some(*run_id);
                self.started_at = Some(*started_at);
                self.suites.clear();
            }
            RunEvent::SuiteEnd { report } => self.suites.push(report.clone()),
            RunEvent::RunEnd { summary } => self.write(summary)?,
            _ => {}
        }
        Ok(())
    }
}
