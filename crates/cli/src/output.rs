//! Output formatting for CLI

use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use specline_common::result::RunSummary;
use std::path::PathBuf;

/// Format of the final run summary on stdout
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum SummaryFormat {
    /// No extra summary; the specs reporter already prints one
    #[default]
    None,
    /// JSON object with suite and spec counts
    Json,
}

/// Print the run summary in the requested format
pub fn print_summary(summary: &RunSummary, format: SummaryFormat) {
    match format {
        SummaryFormat::None => {}
        SummaryFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary).unwrap_or_default());
        }
    }
}

/// Table of discovered suite files
pub fn suites_table(files: &[PathBuf]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["#", "Suite file"]);
    for (i, file) in files.iter().enumerate() {
        table.add_row(vec![(i + 1).to_string(), file.display().to_string()]);
    }
    table
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), message);
}
