//! specline Common Library
//!
//! Suite document model, result types, run events and the error taxonomy
//! shared by the engine, its reporters and the CLI.

pub mod document;
pub mod error;
pub mod event;
pub mod result;

// Re-export commonly used types
pub use document::{
    Body, FormField, FunctionRef, HttpMethod, JsonSchemaRef, LoopSpec, NameValue, Payload,
    SpecDefinition, SpecOverrides, SuiteDocument, TargetConfiguration, DEFAULT_READ_TIMEOUT_MS,
};
pub use error::{Error, ErrorReport, Result};
pub use event::RunEvent;
pub use result::{
    LoopItem, RequestLog, RunKind, RunSummary, SpecResult, Status, SuiteInfo, SuiteReport, Tally,
};

/// specline version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory searched when no suite paths are given
pub fn default_suite_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("specs")
}

/// Run configuration file looked up in the working directory
pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("specline.toml")
}
