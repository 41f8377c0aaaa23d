//! Reporters
//!
//! A reporter sees nothing but the event stream. Each one runs on its own
//! blocking thread with its own receiver and keeps its own state, so
//! `on_event` may do plain file and terminal IO.

pub mod json;
pub mod specs;
pub mod tally;

use specline_common::event::RunEvent;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

pub use json::JsonReporter;
pub use specs::SpecsReporter;
pub use tally::RunTally;

pub trait Reporter: Send {
    fn name(&self) -> &'static str;

    /// Called once per event, in publication order
    fn on_event(&mut self, event: &RunEvent) -> anyhow::Result<()>;
}

/// Build a reporter by name
pub fn build(name: &str, options: &BTreeMap<String, String>) -> Result<Box<dyn Reporter>> {
    match name {
        "specs" => Ok(Box::new(SpecsReporter::stdout())),
        "json" => Ok(Box::new(JsonReporter::from_options(options))),
        other => Err(Error::InvalidRunConfiguration(format!(
            "unknown reporter '{other}', expected one of: specs, json"
        ))),
    }
}
