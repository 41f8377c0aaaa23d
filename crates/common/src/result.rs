//! Execution results shared between the engine and reporters
//!
//! Everything here is built once and then only read. Results are handed to
//! reporters behind `Arc` after the matching event fires.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::document::HttpMethod;
use crate::error::ErrorReport;

/// Terminal status of a spec or a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Skip,
    Pass,
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Skip => write!(f, "skip"),
            Status::Pass => write!(f, "pass"),
            Status::Fail => write!(f, "fail"),
        }
    }
}

/// Loop item a spec iteration ran with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopItem {
    pub index: usize,
    pub value: serde_json::Value,
}

/// Why a spec body ran
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Scheduled by the suite itself
    #[default]
    Spec,
    /// Requested by name from a hook or another spec
    Dependency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedRequest {
    pub method: HttpMethod,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    /// Body was sent as form fields; `body` holds a rendering of them
    #[serde(default)]
    pub form_request: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

/// One request/response exchange made while a spec ran
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLog {
    #[serde(default)]
    pub run: RunKind,
    /// Spec the exchange belongs to
    pub spec: String,
    pub request: LoggedRequest,
    pub response: Option<LoggedResponse>,
    /// Transport failure, when no response was received
    pub error: Option<ErrorReport>,
}

/// Outcome of one spec execution (or one loop iteration)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecResult {
    pub name: String,
    pub status: Status,
    pub duration_ms: u64,
    pub requests: Vec<RequestLog>,
    /// Present iff `status` is `Fail`
    pub error: Option<ErrorReport>,
    pub loop_item: Option<LoopItem>,
}

impl SpecResult {
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Skip,
            duration_ms: 0,
            requests: Vec::new(),
            error: None,
            loop_item: None,
        }
    }

    /// Display name, including the loop index for iterations
    pub fn title(&self) -> String {
        match &self.loop_item {
            Some(item) => format!("{} (item #{})", self.name, item.index),
            None => self.name.clone(),
        }
    }
}

/// Identity of a suite within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteInfo {
    /// Position of the suite in the planned path list
    pub index: usize,
    pub file: PathBuf,
}

/// Final state of a suite, published with `suite-end`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: Arc<SuiteInfo>,
    /// `meta.name`, when the document got far enough to be read
    pub name: Option<String>,
    pub status: Status,
    pub specs: Vec<Arc<SpecResult>>,
    pub error: Option<ErrorReport>,
    pub duration_ms: u64,
}

impl SuiteReport {
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.suite.file.display().to_string())
    }
}

/// Counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn record(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Pass => self.passed += 1,
            Status::Fail => self.failed += 1,
            Status::Skip => self.skipped += 1,
        }
    }
}

/// Aggregate outcome of a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub suites: Tally,
    pub specs: Tally,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn record_suite(&mut self, report: &SuiteReport) {
        self.suites.record(report.status);
        for spec in &report.specs {
            self.specs.record(spec.status);
        }
    }

    pub fn success(&self) -> bool {
        self.suites.failed == 0
    }
}
