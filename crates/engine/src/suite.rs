//! Suite lifecycle
//!
//! A suite moves through its stages strictly in order, each one gating the
//! next:
//!
//! ```text
//! Loading -> SchemaValidating -> ConfigResolving -> DependencyLoading
//!         -> BeforeAllHook -> SpecExecution -> AfterAllHook -> Terminal
//! ```
//!
//! A failure in any stage before `SpecExecution` ends the suite as `fail`.
//! A disabled suite ends as `skip` straight from `Loading`. Specs run one at
//! a time in document order and a failing spec never stops its siblings.

use futures::FutureExt;
use serde_json::Value;
use specline_common::document::{LoopSpec, SpecDefinition, SuiteDocument};
use specline_common::event::RunEvent;
use specline_common::result::{LoopItem, SpecResult, Status, SuiteInfo, SuiteReport};
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::context::{RunContext, Toolkit};
use crate::dependency::{load_dependencies, SpecSource};
use crate::error::{wrap, wrap_user, Error, Result};
use crate::functions::UserContext;
use crate::loader::FileLocator;
use crate::schema::{format_violations, Schema};
use crate::spec::ExecutionScope;
use crate::target::resolve_target;

/// Lifecycle stage of a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Pending,
    Loading,
    SchemaValidating,
    ConfigResolving,
    DependencyLoading,
    BeforeAllHook,
    SpecExecution,
    AfterAllHook,
    Terminal,
}

/// One suite file being driven to a terminal status
pub struct Suite {
    info: Arc<SuiteInfo>,
    toolkit: Arc<Toolkit>,
    context: Arc<RunContext>,
    events: UnboundedSender<RunEvent>,
    stage: Stage,
    /// Unset until `Terminal`, then never changed
    status: Option<Status>,
    name: Option<String>,
    specs: Vec<Arc<SpecResult>>,
    started: Instant,
}

impl Suite {
    pub fn new(
        info: Arc<SuiteInfo>,
        toolkit: Arc<Toolkit>,
        context: Arc<RunContext>,
        events: UnboundedSender<RunEvent>,
    ) -> Self {
        Self {
            info,
            toolkit,
            context,
            events,
            stage: Stage::Pending,
            status: None,
            name: None,
            specs: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.info.file
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Drive the suite to a terminal status and publish `suite-end`.
    pub async fn launch(mut self) -> Arc<SuiteReport> {
        self.started = Instant::now();
        self.emit(RunEvent::SuiteRegistered {
            suite: self.info.clone(),
        });

        let outcome = self.drive().await;
        self.finish(outcome)
    }

    fn emit(&self, event: RunEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver for {} is gone", self.info.file.display());
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug_assert!(stage > self.stage, "suite stages only move forward");
        debug!("{}: {:?}", self.info.file.display(), stage);
        self.stage = stage;
    }

    async fn drive(&mut self) -> Result<()> {
        let file = self.info.file.clone();

        self.enter(Stage::Loading);
        let raw = load_stage(&self.toolkit, &file).await?;
        self.name = raw
            .pointer("/meta/name")
            .and_then(Value::as_str)
            .map(str::to_string);

        self.enter(Stage::SchemaValidating);
        let document = Arc::new(validate_stage(&self.toolkit, &file, raw)?);
        let locator = FileLocator::for_suite(&file, document.meta.locate_files_relative);

        self.enter(Stage::ConfigResolving);
        let target =
            resolve_target(&self.toolkit, &file, &document.configuration, &locator).await?;
        debug!("{} targets {}", file.display(), target.root_url());

        self.enter(Stage::DependencyLoading);
        let dependencies = load_dependencies(&self.toolkit, &document, &locator).await?;

        let own = Arc::new(SpecSource::new(file.clone(), document.clone(), target, locator.clone()));
        let scope = ExecutionScope::new(self.toolkit.clone(), own, dependencies, UserContext::new());

        if document.specs.is_empty() {
            return Err(Error::NoSpecsFound(format!(
                "No specs found in file '{}'",
                file.display()
            )));
        }

        self.enter(Stage::BeforeAllHook);
        if let Some(hook) = &document.hooks.before_all {
            self.toolkit
                .functions
                .invoke(hook, &locator, scope.hook_context())
                .await
                .map_err(|err| wrap_user(&err, "running the before all hook", Error::BeforeAllHook))?;
        }

        self.enter(Stage::SpecExecution);
        for spec in &document.specs {
            self.run_definition(&scope, spec).await;
        }
        scope.reset_log();

        self.enter(Stage::AfterAllHook);
        if let Some(hook) = &document.hooks.after_all {
            self.toolkit
                .functions
                .invoke(hook, &locator, scope.hook_context())
                .await
                .map_err(|err| wrap_user(&err, "running the after all hook", Error::AfterAllHook))?;
        }

        Ok(())
    }

    fn finish(&mut self, outcome: Result<()>) -> Arc<SuiteReport> {
        let (status, error) = match outcome {
            Ok(()) if self.specs.iter().any(|s| s.status == Status::Fail) => (Status::Fail, None),
            Ok(()) => (Status::Pass, None),
            Err(Error::DisabledSuite(message)) => {
                info!("{message}");
                (Status::Skip, None)
            }
            Err(err) => {
                warn!("{} failed: {}: {}", self.info.file.display(), err.kind(), err);
                (Status::Fail, Some(err.report()))
            }
        };

        self.stage = Stage::Terminal;
        if self.status.is_none() {
            self.status = Some(status);
        }

        let report = Arc::new(SuiteReport {
            suite: self.info.clone(),
            name: self.name.clone(),
            status,
            specs: self.specs.clone(),
            error,
            duration_ms: self.started.elapsed().as_millis() as u64,
        });
        self.emit(RunEvent::SuiteEnd {
            report: report.clone(),
        });
        report
    }

    fn is_skippable(&self, spec: &SpecDefinition) -> bool {
        if spec.enabled == Some(false) {
            return true;
        }
        match &self.context.options.filter {
            Some(filter) => !filter.matches(&spec.name),
            None => false,
        }
    }

    async fn run_definition(&mut self, scope: &ExecutionScope, spec: &SpecDefinition) {
        scope.reset_log();

        if self.is_skippable(spec) {
            let result = Arc::new(SpecResult::skipped(&spec.name));
            self.specs.push(result.clone());
            self.emit(RunEvent::SpecSkip {
                suite: self.info.clone(),
                spec: result,
            });
            return;
        }

        let Some(loop_spec) = &spec.loop_spec else {
            self.run_once(scope, spec, None).await;
            return;
        };

        let started = Instant::now();
        match fetch_loop_items(scope, loop_spec).await {
            Ok(items) => {
                for (index, value) in items.into_iter().enumerate() {
                    scope.reset_log();
                    self.run_once(scope, spec, Some(LoopItem { index, value }))
                        .await;
                }
            }
            Err(err) => {
                // No iteration ran; the parent spec carries the failure
                let result = SpecResult {
                    name: spec.name.clone(),
                    status: Status::Fail,
                    duration_ms: started.elapsed().as_millis() as u64,
                    requests: scope.take_log(),
                    error: Some(err.report()),
                    loop_item: None,
                };
                self.record(result);
            }
        }
    }

    async fn run_once(&mut self, scope: &ExecutionScope, spec: &SpecDefinition, item: Option<LoopItem>) {
        self.emit(RunEvent::SpecStart {
            suite: self.info.clone(),
            name: spec.name.clone(),
            loop_item: item.clone(),
        });

        let started = Instant::now();
        let outcome = AssertUnwindSafe(scope.execute(spec, item.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(Error::SuitePanicked(format!(
                    "spec '{}' panicked: {}",
                    spec.name,
                    panic_message(panic.as_ref())
                )))
            });

        let (status, error) = match outcome {
            Ok(_) => (Status::Pass, None),
            Err(err) => (Status::Fail, Some(err.report())),
        };
        self.record(SpecResult {
            name: spec.name.clone(),
            status,
            duration_ms: started.elapsed().as_millis() as u64,
            requests: scope.take_log(),
            error,
            loop_item: item,
        });
    }

    /// Freeze a result and publish it; it is not touched afterwards
    fn record(&mut self, result: SpecResult) {
        let result = Arc::new(result);
        self.specs.push(result.clone());

        let suite = self.info.clone();
        let event = match result.error.clone() {
            Some(error) => RunEvent::SpecFail {
                suite,
                error,
                spec: result,
            },
            None => RunEvent::SpecPass {
                suite,
                spec: result,
            },
        };
        self.emit(event);
    }
}

/// Read a suite file and check the parts needed before validation.
///
/// Missing `meta` is `InvalidYAMLSuiteSchemaError`; `meta.enabled: false` is
/// `DisabledSuiteError`, which callers turn into a skip.
pub(crate) async fn load_stage(toolkit: &Toolkit, file: &Path) -> Result<Value> {
    let raw = toolkit.loader.load(file).await?;

    match raw.get("meta") {
        None | Some(Value::Null) => Err(Error::InvalidSuiteDocument(format!(
            "Metadata is not specified in suite '{}'",
            file.display()
        ))),
        Some(meta) if meta.get("enabled") == Some(&Value::Bool(false)) => {
            Err(Error::DisabledSuite(format!(
                "Suite '{}' is disabled, skipping the suite",
                file.display()
            )))
        }
        Some(_) => Ok(raw),
    }
}

/// Validate the whole document and decode it
pub(crate) fn validate_stage(toolkit: &Toolkit, file: &Path, raw: Value) -> Result<SuiteDocument> {
    let violations = toolkit.validator.validate(&raw, Schema::Suite);
    if !violations.is_empty() {
        return Err(Error::InvalidSuiteSchema(format!(
            "invalid schema found in file {} \n {}",
            file.display(),
            format_violations(&violations)
        )));
    }

    serde_json::from_value(raw).map_err(|e| {
        Error::InvalidSuiteSchema(format!(
            "invalid schema found in file {} \n {e}",
            file.display()
        ))
    })
}

async fn fetch_loop_items(scope: &ExecutionScope, loop_spec: &LoopSpec) -> Result<Vec<Value>> {
    let items = match loop_spec {
        LoopSpec::Static { items } => items.clone(),
        LoopSpec::Dynamic { dynamic } => scope
            .toolkit()
            .functions
            .invoke(dynamic, &scope.own().locator, scope.hook_context())
            .await
            .map_err(|err| wrap_user(&err, "building loop items", Error::LoopItemsBuilder))?,
    };

    match items {
        Value::Array(items) => Ok(items),
        _ => {
            let root = Error::InvalidSpecificationSchema(match loop_spec {
                LoopSpec::Static { .. } => "Loop static items are not an Array".to_string(),
                LoopSpec::Dynamic { .. } => {
                    "Loop dynamic function did not return an Array".to_string()
                }
            });
            Err(wrap(&root, "building loop items", Error::LoopItemsBuilder))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpRequest, HttpResponse, Transport};
    use async_trait::async_trait;
    use std::io::Write;
    use tokio::sync::mpsc;

    struct Ok200;

    #[async_trait]
    impl Transport for Ok200 {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                cookies: Default::default(),
                body: "{}".into(),
                duration_ms: 1,
            })
        }
    }

    fn suite_file(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{yaml}").unwrap();
        file
    }

    async fn launch(path: &Path) -> (Arc<SuiteReport>, Vec<RunEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let suite = Suite::new(
            Arc::new(SuiteInfo {
                index: 0,
                file: path.to_path_buf(),
            }),
            Arc::new(Toolkit::with_transport(Arc::new(Ok200))),
            Arc::new(RunContext::default()),
            tx,
        );
        let report = suite.launch().await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (report, events)
    }

    #[tokio::test]
    async fn test_disabled_suite_is_skipped() {
        let file = suite_file("meta:\n  name: off\n  enabled: false\nconfiguration: {}\nspecs: []\n");
        let (report, events) = launch(file.path()).await;

        assert_eq!(report.status, Status::Skip);
        assert!(report.error.is_none());
        assert!(report.specs.is_empty());
        let names: Vec<_> = events.iter().map(RunEvent::name).collect();
        assert_eq!(names, vec!["suite-registered", "suite-end"]);
    }

    #[tokio::test]
    async fn test_missing_meta() {
        let file = suite_file("configuration: {}\nspecs: []\n");
        let (report, _) = launch(file.path()).await;

        assert_eq!(report.status, Status::Fail);
        assert_eq!(report.error.as_ref().unwrap().kind, "InvalidYAMLSuiteSchemaError");
    }

    #[tokio::test]
    async fn test_no_specs() {
        let file = suite_file(
            "meta:\n  name: empty\nconfiguration:\n  scheme: http\n  host: localhost\nspecs: []\n",
        );
        let (report, _) = launch(file.path()).await;

        assert_eq!(report.status, Status::Fail);
        assert_eq!(report.error.as_ref().unwrap().kind, "NoSpecsFoundError");
        assert_eq!(report.name.as_deref(), Some("empty"));
    }

    #[tokio::test]
    async fn test_static_loop_runs_each_item() {
        let file = suite_file(
            r#"
meta:
  name: loop
configuration:
  scheme: http
  host: localhost
specs:
  - name: each
    loop:
      type: static
      static: [a, b, c]
    request:
      path: /items
    response:
      status_code: 200
"#,
        );
        let (report, _) = launch(file.path()).await;

        assert_eq!(report.status, Status::Pass);
        assert_eq!(report.specs.len(), 3);
        let indexes: Vec<_> = report
            .specs
            .iter()
            .map(|s| s.loop_item.as_ref().unwrap().index)
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert!(report.specs.iter().all(|s| s.requests.len() == 1));
    }

    #[test]
    fn test_stages_are_ordered() {
        assert!(Stage::Loading < Stage::SchemaValidating);
        assert!(Stage::ConfigResolving < Stage::DependencyLoading);
        assert!(Stage::AfterAllHook < Stage::Terminal);
    }
}
