//! Bounded-concurrency launcher
//!
//! Runs every planned suite to a terminal status with at most `parallel`
//! suites in flight. When one ends, the next queued path starts straight
//! away, in plan order. Suite events are relayed onto the shared bus;
//! `run-end` is published only after the last `suite-end`.

use futures::FutureExt;
use specline_common::event::RunEvent;
use specline_common::result::{RunSummary, Status, SuiteInfo, SuiteReport};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bus::EventBus;
use crate::config::{check_ceiling, RunOptions, MAX_PARALLEL_LIMIT};
use crate::context::{RunContext, Toolkit};
use crate::error::{Error, Result};
use crate::reporter::Reporter;
use crate::suite::Suite;

pub struct Launcher {
    toolkit: Arc<Toolkit>,
    options: RunOptions,
    bus: EventBus,
    reporters: Vec<Box<dyn Reporter>>,
}

impl Launcher {
    /// Fails when the concurrency ceiling is outside `[1, MAX_PARALLEL_LIMIT]`.
    ///
    /// `1` is accepted here since it is the default of [`RunOptions`];
    /// user input goes through `validate_parallel` first.
    pub fn new(toolkit: Toolkit, options: RunOptions) -> Result<Self> {
        check_ceiling(options.parallel)?;
        debug!("Launcher ceiling {} (limit {})", options.parallel, MAX_PARALLEL_LIMIT);

        Ok(Self {
            toolkit: Arc::new(toolkit),
            options,
            bus: EventBus::new(),
            reporters: Vec::new(),
        })
    }

    /// Attach a reporter; it gets its own event stream for the run
    pub fn add_reporter(&mut self, reporter: Box<dyn Reporter>) -> &mut Self {
        self.reporters.push(reporter);
        self
    }

    /// Raw event stream, for callers that are not reporters
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<RunEvent> {
        self.bus.subscribe()
    }

    /// Run all suites and return the aggregate outcome
    pub async fn run(self, paths: Vec<PathBuf>) -> RunSummary {
        let Launcher {
            toolkit,
            options,
            bus,
            reporters,
        } = self;

        // Reporters do blocking IO; each gets its own blocking thread
        let mut reporter_tasks = Vec::with_capacity(reporters.len());
        for mut reporter in reporters {
            let mut events = bus.subscribe();
            reporter_tasks.push(tokio::task::spawn_blocking(move || {
                while let Some(event) = events.blocking_recv() {
                    if let Err(e) = reporter.on_event(&event) {
                        warn!("Reporter '{}' failed on {}: {:#}", reporter.name(), event.name(), e);
                    }
                }
            }));
        }

        let context = Arc::new(RunContext::new(options));
        let parallel = context.options.parallel;
        let paths = Arc::new(paths);
        info!("Running {} suite(s), {} at a time", paths.len(), parallel);

        bus.publish(RunEvent::RunStart {
            run_id: context.run_id,
            started_at: context.started_at,
            paths: paths.clone(),
        });

        let (events_tx, mut events_rx) = unbounded_channel::<RunEvent>();
        let relay_bus = bus.clone();
        let relay = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                relay_bus.publish(event);
            }
        });

        let mut queue: VecDeque<Arc<SuiteInfo>> = paths
            .iter()
            .enumerate()
            .map(|(index, file)| {
                Arc::new(SuiteInfo {
                    index,
                    file: file.clone(),
                })
            })
            .collect();
        let mut active: JoinSet<Arc<SuiteReport>> = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            while active.len() < parallel {
                let Some(info) = queue.pop_front() else {
                    break;
                };
                debug!("Starting suite {}", info.file.display());
                active.spawn(run_suite(
                    info,
                    toolkit.clone(),
                    context.clone(),
                    events_tx.clone(),
                ));
            }

            match active.join_next().await {
                Some(Ok(report)) => summary.record_suite(&report),
                Some(Err(e)) => {
                    error!("Suite task ended abnormally: {}", e);
                    summary.suites.record(Status::Fail);
                }
                None => break,
            }
        }

        drop(events_tx);
        if let Err(e) = relay.await {
            error!("Event relay ended abnormally: {}", e);
        }

        summary.duration_ms = context.elapsed_ms();
        info!(
            "Run finished: {} passed, {} failed, {} skipped ({} ms)",
            summary.suites.passed, summary.suites.failed, summary.suites.skipped, summary.duration_ms
        );
        bus.publish(RunEvent::RunEnd {
            summary: summary.clone(),
        });
        bus.close();

        for task in reporter_tasks {
            if let Err(e) = task.await {
                error!("Reporter task ended abnormally: {}", e);
            }
        }

        summary
    }
}

/// Drive one suite; a panic becomes a terminal fail with its own `suite-end`
async fn run_suite(
    info: Arc<SuiteInfo>,
    toolkit: Arc<Toolkit>,
    context: Arc<RunContext>,
    events: UnboundedSender<RunEvent>,
) -> Arc<SuiteReport> {
    let started = Instant::now();
    let suite = Suite::new(info.clone(), toolkit, context, events.clone());

    match AssertUnwindSafe(suite.launch()).catch_unwind().await {
        Ok(report) => report,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            let err = Error::SuitePanicked(format!(
                "suite '{}' panicked: {}",
                info.file.display(),
                message
            ));
            error!("{}", err);

            let report = Arc::new(SuiteReport {
                suite: info,
                name: None,
                status: Status::Fail,
                specs: Vec::new(),
                error: Some(err.report()),
                duration_ms: started.elapsed().as_millis() as u64,
            });
            let _ = events.send(RunEvent::SuiteEnd {
                report: report.clone(),
            });
            report
        }
    }
}
