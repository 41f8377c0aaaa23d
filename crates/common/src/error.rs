//! Error types for specline
//!
//! Every variant maps to one named kind of the run taxonomy. Wrapping errors
//! are built by interpolating the wrapped error's kind and message, so the
//! root cause stays readable in the final text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using the specline Error
pub type Result<T> = std::result::Result<T, Error>;

/// specline error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    FileDoesNotExist(String),

    #[error("{0}")]
    NotAFile(String),

    #[error("{0}")]
    SuiteLoading(String),

    #[error("{0}")]
    InvalidSuiteDocument(String),

    #[error("{0}")]
    InvalidSuiteSchema(String),

    #[error("{0}")]
    DisabledSuite(String),

    #[error("{0}")]
    InvalidSuiteConfiguration(String),

    #[error("{0}")]
    SuiteCustomConfiguration(String),

    #[error("{0}")]
    LoadingSpecDependencySuite(String),

    #[error("{0}")]
    NoSpecsFound(String),

    #[error("{0}")]
    NoSpecFoundMatchingName(String),

    #[error("{0}")]
    LoopItemsBuilder(String),

    #[error("{0}")]
    InvalidSpecificationSchema(String),

    #[error("{0}")]
    BeforeAllHook(String),

    #[error("{0}")]
    AfterAllHook(String),

    #[error("{0}")]
    BeforeEachHook(String),

    #[error("{0}")]
    AfterEachHook(String),

    #[error("{0}")]
    BeforeTestHook(String),

    #[error("{0}")]
    AfterTestHook(String),

    #[error("{0}")]
    CustomFunctionNotFoundInModule(String),

    #[error("{0}")]
    NotAFunction(String),

    #[error("{0}")]
    ModuleLoading(String),

    #[error("{0}")]
    InvalidRequestSpecification(String),

    #[error("{0}")]
    RequestBodyBuilder(String),

    #[error("{0}")]
    Request(String),

    #[error("{0}")]
    ResponseStatusCodeDidNotMatch(String),

    #[error("{0}")]
    ResponseHeaderValueDidNotMatch(String),

    #[error("{0}")]
    ResponseCookieValueDidNotMatch(String),

    #[error("{0}")]
    JsonBodyParse(String),

    #[error("{0}")]
    ResponseJsonSchemaValidation(String),

    #[error("{0}")]
    ResponseJsonDataMismatch(String),

    #[error("{0}")]
    CustomResponseValidation(String),

    #[error("{0}")]
    InvalidRunConfiguration(String),

    #[error("{0}")]
    SuitePanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Taxonomy name of this error, as shown in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::FileDoesNotExist(_) => "FileDoesNotExist",
            Error::NotAFile(_) => "NotAFileError",
            Error::SuiteLoading(_) => "YAMLSuiteLoadingError",
            Error::InvalidSuiteDocument(_) => "InvalidYAMLSuiteSchemaError",
            Error::InvalidSuiteSchema(_) => "InvalidSuiteSchemaError",
            Error::DisabledSuite(_) => "DisabledSuiteError",
            Error::InvalidSuiteConfiguration(_) => "InvalidSuiteConfigurationError",
            Error::SuiteCustomConfiguration(_) => "SuiteCustomConfigurationError",
            Error::LoadingSpecDependencySuite(_) => "LoadingSpecDependencySuiteError",
            Error::NoSpecsFound(_) => "NoSpecsFoundError",
            Error::NoSpecFoundMatchingName(_) => "NoSpecFoundMatchingNameError",
            Error::LoopItemsBuilder(_) => "LoopItemsBuilderError",
            Error::InvalidSpecificationSchema(_) => "InvalidSpecificationSchemaError",
            Error::BeforeAllHook(_) => "BeforeAllHookError",
            Error::AfterAllHook(_) => "AfterAllHookError",
            Error::BeforeEachHook(_) => "BeforeEachHookError",
            Error::AfterEachHook(_) => "AfterEachHookError",
            Error::BeforeTestHook(_) => "BeforeTestHookError",
            Error::AfterTestHook(_) => "AfterTestHookError",
            Error::CustomFunctionNotFoundInModule(_) => "CustomFunctionNotFoundInModuleError",
            Error::NotAFunction(_) => "NotAFunctionError",
            Error::ModuleLoading(_) => "ModuleLoadingError",
            Error::InvalidRequestSpecification(_) => "InvalidRequestSpecificationError",
            Error::RequestBodyBuilder(_) => "RequestBodyBuilderError",
            Error::Request(_) => "RequestError",
            Error::ResponseStatusCodeDidNotMatch(_) => "ResponseStatusCodeDidNotMatchError",
            Error::ResponseHeaderValueDidNotMatch(_) => "ResponseHeaderValueDidNotMatchError",
            Error::ResponseCookieValueDidNotMatch(_) => "ResponseCookieValueDidNotMatchError",
            Error::JsonBodyParse(_) => "JSONBodyParseError",
            Error::ResponseJsonSchemaValidation(_) => "ResponseJSONSchemaValidationError",
            Error::ResponseJsonDataMismatch(_) => "ResponseJSONDataMismatchError",
            Error::CustomResponseValidation(_) => "CustomResponseValidationError",
            Error::InvalidRunConfiguration(_) => "InvalidRunConfigurationError",
            Error::SuitePanicked(_) => "SuitePanicError",
            Error::Io(_) => "IOError",
        }
    }

    /// Serializable snapshot of this error.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Error as carried by results and events: the kind plus the rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: String,
    pub message: String,
}

impl ErrorReport {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        err.report()
    }
}
