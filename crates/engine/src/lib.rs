//! specline execution engine
//!
//! This crate runs declarative API test suites against live HTTP endpoints:
//! - Loads and validates YAML suite documents
//! - Drives each suite through its lifecycle stages
//! - Executes specs (and loop iterations) one at a time per suite
//! - Schedules many suites under a concurrency ceiling
//! - Streams run events to independent reporters
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Launcher                                                    │
//! │    ├── queue of suite paths (FIFO)                           │
//! │    ├── JoinSet of at most `parallel` Suites                  │
//! │    └── EventBus ──► Reporter tasks (specs, json, ...)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suite                                                       │
//! │    ├── Loading ─► SchemaValidating ─► ConfigResolving        │
//! │    ├── DependencyLoading (SpecSource per dependency)         │
//! │    ├── BeforeAllHook ─► SpecExecution ─► AfterAllHook        │
//! │    └── Terminal { pass | fail | skip }                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ExecutionScope                                              │
//! │    ├── before_each ─► before_test ─► request ─► Transport    │
//! │    ├── validate ─► after_test ─► after_each                  │
//! │    └── SpecRunner (run_spec: own specs, then dependencies)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bus;
pub mod config;
pub mod context;
pub mod dependency;
pub mod discovery;
pub mod error;
pub mod functions;
pub mod launcher;
pub mod loader;
pub mod reporter;
pub mod schema;
pub mod spec;
pub mod suite;
pub mod target;
pub mod transport;

pub use bus::EventBus;
pub use config::{RunConfig, RunOptions, SpecFilter, MAX_PARALLEL_LIMIT};
pub use context::{RunContext, Toolkit};
pub use discovery::{discover, Discovery};
pub use error::{Error, Result};
pub use functions::{
    callable, Callable, FunctionRegistry, HookContext, ModuleRegistry, ModuleResolver,
    StaticModule, UserContext,
};
pub use launcher::Launcher;
pub use reporter::Reporter;
pub use suite::{Stage, Suite};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, MultipartField, RequestBody, Transport,
};
