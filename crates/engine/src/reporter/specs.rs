//! Console reporter

use colored::Colorize;
use specline_common::event::RunEvent;
use specline_common::result::Status;
use std::io::Write;

use super::tally::{Failure, RunTally};
use super::Reporter;

const OK: &str = "✓";
const ERR: &str = "✖";

/// Prints a line per spec, a line per finished suite and a final summary
pub struct SpecsReporter<W: Write + Send> {
    out: W,
    tally: RunTally,
}

impl SpecsReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> SpecsReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            tally: RunTally::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn summary(&mut self, duration_ms: u64) -> std::io::Result<()> {
        let specs = self.tally.spec_totals();
        let suites = self.tally.suite_totals();

        writeln!(self.out)?;
        writeln!(
            self.out,
            "{}{}{}({} tests)",
            format!("{} skipped, ", specs.skipped).cyan(),
            format!("{} failed, ", specs.failed).red(),
            format!("{} passed ", specs.passed).green(),
            specs.total
        )?;
        writeln!(
            self.out,
            "{}{}{}({} suites)",
            format!("{} skipped, ", suites.skipped).cyan(),
            format!("{} failed, ", suites.failed).red(),
            format!("{} passed ", suites.passed).green(),
            self.tally.planned
        )?;
        writeln!(self.out, "Duration: {}", format_duration(duration_ms))?;

        let failures = self.tally.failures();
        if !failures.is_empty() {
            writeln!(self.out, "\nFailures:")?;
        }
        for (i, failure) in failures.iter().enumerate() {
            writeln!(self.out)?;
            match failure {
                Failure::Suite { file, error } => {
                    writeln!(self.out, "{}", format!(" {}) Suite failure: {}", i + 1, file.display()).red())?;
                    writeln!(self.out, "{}", error.to_string().red())?;
                }
                Failure::Spec { file, title, error } => {
                    writeln!(self.out, "{}", format!(" {}) {} ({})", i + 1, title, file.display()).red())?;
                    writeln!(self.out, "{}", error.to_string().red())?;
                }
            }
        }
        Ok(())
    }
}

impl<W: Write + Send> Reporter for SpecsReporter<W> {
    fn name(&self) -> &'static str {
        "specs"
    }

    fn on_event(&mut self, event: &RunEvent) -> anyhow::Result<()> {
        self.tally.apply(event);

        match event {
            RunEvent::RunStart { paths, .. } => {
                let files: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                writeln!(self.out)?;
                writeln!(self.out, "Launcher will run suites: {}", files.join(","))?;
            }
            RunEvent::SpecPass { spec, .. } => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "{}",
                    format!("   {OK} {} ({}ms)", spec.title(), spec.duration_ms).green()
                )?;
            }
            RunEvent::SpecFail { spec, .. } => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "{}",
                    format!("   {ERR} {} ({}ms)", spec.title(), spec.duration_ms).red()
                )?;
            }
            RunEvent::SpecSkip { spec, .. } => {
                writeln!(self.out)?;
                writeln!(
                    self.out,
                    "{}",
                    format!("   - {} ({}ms)", spec.title(), spec.duration_ms).cyan()
                )?;
            }
            RunEvent::SuiteEnd { report } => {
                let file = report.suite.file.display();
                writeln!(self.out)?;
                let line = match report.status {
                    Status::Pass => format!("  Done: {file} (Passed)").green(),
                    Status::Skip => format!("  Done: {file} (Skipped)").cyan(),
                    Status::Fail => format!("  Done: {file} (Failed)").red(),
                };
                writeln!(self.out, "{line}")?;
            }
            RunEvent::RunEnd { summary } => {
                self.summary(summary.duration_ms)?;
                writeln!(self.out)?;
            }
            RunEvent::SuiteRegistered { .. } | RunEvent::SpecStart { .. } => {}
        }

        self.out.flush()?;
        Ok(())
    }
}

fn format_duration(ms: u64) -> String {
    match ms {
        0..=999 => format!("{ms}ms"),
        1_000..=59_999 => format!("{:.1}s", ms as f64 / 1000.0),
        _ => format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000),
    }
}
