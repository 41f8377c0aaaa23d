//! Collaborators and per-run state threaded through the engine

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::RunOptions;
use crate::error::Result;
use crate::functions::{FunctionRegistry, FunctionResolver, ModuleRegistry, ModuleResolver};
use crate::loader::{SuiteLoader, YamlLoader};
use crate::schema::{JsonSchemaValidator, SchemaValidator};
use crate::transport::{HttpTransport, Transport};

/// External collaborators used by suites
#[derive(Clone)]
pub struct Toolkit {
    pub loader: Arc<dyn SuiteLoader>,
    pub validator: Arc<dyn SchemaValidator>,
    pub transport: Arc<dyn Transport>,
    pub functions: FunctionResolver,
}

impl Toolkit {
    /// YAML loader, builtin validator, reqwest transport and command modules
    pub fn new() -> Result<Self> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new()?)))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            loader: Arc::new(YamlLoader),
            validator: Arc::new(JsonSchemaValidator),
            transport,
            functions: FunctionResolver::default(),
        }
    }

    pub fn functions(mut self, inline: FunctionRegistry, modules: ModuleRegistry) -> Self {
        self.functions = FunctionResolver::new(inline, Arc::new(modules));
        self
    }

    pub fn module_resolver(mut self, inline: FunctionRegistry, modules: Arc<dyn ModuleResolver>) -> Self {
        self.functions = FunctionResolver::new(inline, modules);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn SuiteLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }
}

/// Identity and options of one run, created by the launcher
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub started: Instant,
    pub options: RunOptions,
}

impl RunContext {
    pub fn new(options: RunOptions) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            started: Instant::now(),
            options,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(RunOptions::default())
    }
}
