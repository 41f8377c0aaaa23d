//! Running tally kept by reporters
//!
//! Built only from events, so a reporter never reads engine state directly.

use chrono::{DateTime, Utc};
use specline_common::error::ErrorReport;
use specline_common::event::RunEvent;
use specline_common::result::{Status, Tally};
use std::path::PathBuf;
use uuid::Uuid;

/// A spec failure or a suite-level failure
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Suite { file: PathBuf, error: ErrorReport },
    Spec { file: PathBuf, title: String, error: ErrorReport },
}

#[derive(Debug, Clone)]
pub struct SuiteTally {
    pub file: PathBuf,
    pub status: Option<Status>,
    pub specs: Tally,
    pub failures: Vec<(String, ErrorReport)>,
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, Default)]
pub struct RunTally {
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub planned: usize,
    /// Indexed by the suite's position in the planned path list
    pub suites: Vec<Option<SuiteTally>>,
    pub finished: bool,
}

impl RunTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &RunEvent) {
        match event {
            RunEvent::RunStart {
                run_id,
                started_at,
                paths,
            } => {
                self.run_id = Some(*run_id);
                self.started_at = Some(*started_at);
                self.planned = paths.len();
                self.suites = vec![None; paths.len()];
            }
            RunEvent::SuiteRegistered { suite } => {
                let slot = self.slot(suite.index);
                *slot = Some(SuiteTally {
                    file: suite.file.clone(),
                    status: None,
                    specs: Tally::default(),
                    failures: Vec::new(),
                    error: None,
                });
            }
            RunEvent::SpecStart { .. } => {}
            RunEvent::SpecPass { suite, spec } | RunEvent::SpecSkip { suite, spec } => {
                if let Some(tally) = self.slot(suite.index) {
                    tally.specs.record(spec.status);
                }
            }
            RunEvent::SpecFail { suite, spec, error } => {
                if let Some(tally) = self.slot(suite.index) {
                    tally.specs.record(spec.status);
                    tally.failures.push((spec.title(), error.clone()));
                }
            }
            RunEvent::SuiteEnd { report } => {
                if let Some(tally) = self.slot(report.suite.index) {
                    tally.status = Some(report.status);
                    tally.error = report.error.clone();
                }
            }
            RunEvent::RunEnd { .. } => self.finished = true,
        }
    }

    fn slot(&mut self, index: usize) -> &mut Option<SuiteTally> {
        if self.suites.len() <= index {
            self.suites.resize(index + 1, None);
        }
        &mut self.suites[index]
    }

    fn registered(&self) -> impl Iterator<Item = &SuiteTally> {
        self.suites.iter().flatten()
    }

    pub fn suite_totals(&self) -> Tally {
        let mut totals = Tally::default();
        for suite in self.registered() {
            totals.record(suite.status.unwrap_or(Status::Fail));
        }
        totals
    }

    pub fn spec_totals(&self) -> Tally {
        let mut totals = Tally::default();
        for suite in self.registered() {
            totals.total += suite.specs.total;
            totals.passed += suite.specs.passed;
            totals.failed += suite.specs.failed;
            totals.skipped += suite.specs.skipped;
        }
        totals
    }

    /// Suite failures replace that suite's spec failures, in plan order
    pub fn failures(&self) -> Vec<Failure> {
        let mut out = Vec::new();
        for suite in self.registered() {
            match &suite.error {
                Some(error) => out.push(Failure::Suite {
                    file: suite.file.clone(),
                    error: error.clone(),
                }),
                None => out.extend(suite.failures.iter().map(|(title, error)| Failure::Spec {
                    file: suite.file.clone(),
                    title: title.clone(),
                    error: error.clone(),
                })),
            }
        }
        out
    }
}
