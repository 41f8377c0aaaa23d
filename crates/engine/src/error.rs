//! Error helpers for the engine
//!
//! The taxonomy itself lives in `specline_common::error`. User functions
//! report failures as `anyhow::Error`; these helpers recover a taxonomy kind
//! from them and build wrapping messages that keep the root cause readable.

pub use specline_common::error::{Error, ErrorReport, Result};

/// Kind name of a user-function failure; `"Error"` when it is not one of ours.
pub fn kind_of(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<Error>().map(Error::kind).unwrap_or("Error")
}

/// `"<kind> occurred while <activity> \n <message>"`
pub fn occurred_while(kind: &str, activity: &str, message: impl std::fmt::Display) -> String {
    format!("{kind} occurred while {activity} \n {message}")
}

/// Wrap a taxonomy error raised during `activity` into another kind.
pub fn wrap(err: &Error, activity: &str, into: fn(String) -> Error) -> Error {
    into(occurred_while(err.kind(), activity, err))
}

/// Wrap a user-function failure raised during `activity` into another kind.
pub fn wrap_user(err: &anyhow::Error, activity: &str, into: fn(String) -> Error) -> Error {
    into(occurred_while(kind_of(err), activity, format!("{err:#}")))
}

/// Convert a user-function failure back into a taxonomy error, keeping its kind
/// when it already is one.
pub fn from_user(err: anyhow::Error, fallback: fn(String) -> Error) -> Error {
    match err.downcast::<Error>() {
        Ok(err) => err,
        Err(other) => fallback(format!("{other:#}")),
    }
}
