//! Run events
//!
//! The only surface reporters observe. Payloads are shared snapshots and are
//! never mutated after the event is sent.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ErrorReport;
use crate::result::{LoopItem, RunSummary, SpecResult, SuiteInfo, SuiteReport};

#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Fired before any suite begins
    RunStart {
        run_id: Uuid,
        started_at: DateTime<Utc>,
        paths: Arc<Vec<PathBuf>>,
    },

    /// A suite was admitted by the scheduler
    SuiteRegistered { suite: Arc<SuiteInfo> },

    SpecStart {
        suite: Arc<SuiteInfo>,
        name: String,
        loop_item: Option<LoopItem>,
    },

    SpecPass {
        suite: Arc<SuiteInfo>,
        spec: Arc<SpecResult>,
    },

    SpecFail {
        suite: Arc<SuiteInfo>,
        spec: Arc<SpecResult>,
        error: ErrorReport,
    },

    SpecSkip {
        suite: Arc<SuiteInfo>,
        spec: Arc<SpecResult>,
    },

    /// Suite reached a terminal status; `report.error` holds a lifecycle failure
    SuiteEnd { report: Arc<SuiteReport> },

    /// Fired once, after every suite has ended
    RunEnd { summary: RunSummary },
}

impl RunEvent {
    /// Stable event name, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStart { .. } => "run-start",
            RunEvent::SuiteRegistered { .. } => "suite-registered",
            RunEvent::SpecStart { .. } => "spec-start",
            RunEvent::SpecPass { .. } => "spec-pass",
            RunEvent::SpecFail { .. } => "spec-fail",
            RunEvent::SpecSkip { .. } => "spec-skip",
            RunEvent::SuiteEnd { .. } => "suite-end",
            RunEvent::RunEnd { .. } => "run-end",
        }
    }
}
