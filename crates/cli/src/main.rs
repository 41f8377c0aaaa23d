//! specline CLI - Main Entry Point
//!
//! Discovers suite files, runs them through the launcher and exits with
//! 0 when every suite passed, 1 when any suite failed and 2 on
//! configuration errors.

use clap::Parser;
use std::path::PathBuf;
use tracing::debug;

use specline_engine::config::{parse_reporter_options, RunConfig};
use specline_engine::{discover, reporter, Launcher, Toolkit};

mod output;

use output::{print_error, print_summary, print_warning, suites_table, SummaryFormat};

/// specline - declarative API test runner
#[derive(Parser, Debug)]
#[command(name = "specline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Suite files, directories or bare names (default: ./specs)
    paths: Vec<PathBuf>,

    /// Number of suites to run concurrently (> 1 and <= 24)
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Reporters to attach, comma separated (specs is always attached)
    #[arg(long, value_delimiter = ',')]
    reporter: Vec<String>,

    /// Reporter options as k=v pairs, comma separated
    #[arg(long)]
    reporter_options: Option<String>,

    /// Only run specs whose name matches, `/pattern/i` or a bare pattern
    #[arg(short, long)]
    grep: Option<String>,

    /// Descend into subdirectories when looking for suites
    #[arg(short, long)]
    recursive: bool,

    /// Run configuration file
    #[arg(long, env = "SPECLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Print the discovered suites and exit
    #[arg(long)]
    list: bool,

    /// Extra summary printed to stdout after the run
    #[arg(long, value_enum, default_value = "none")]
    summary: SummaryFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(specline_common::default_config_path);
    let config = merge(RunConfig::load(&config_path)?, &cli)?;
    let options = config.options()?;
    debug!(
        "Run options: parallel={}, reporters={:?}, filter={}",
        options.parallel,
        options.reporters,
        config.grep.as_deref().unwrap_or("-")
    );

    let paths = if cli.paths.is_empty() {
        vec![specline_common::default_suite_dir()]
    } else {
        cli.paths.clone()
    };
    let discovery = discover(&paths, config.recursive);
    for missing in &discovery.missing {
        print_warning(&format!("no suites found using path {}", missing.display()));
    }
    if discovery.files.is_empty() {
        anyhow::bail!("no suite files found");
    }

    if cli.list {
        println!("{}", suites_table(&discovery.files));
        return Ok(true);
    }

    let mut launcher = Launcher::new(Toolkit::new()?, options.clone())?;
    for name in &options.reporters {
        launcher.add_reporter(reporter::build(name, &options.reporter_options)?);
    }

    let summary = launcher.run(discovery.files).await;
    print_summary(&summary, cli.summary);
    Ok(summary.success())
}

/// CLI flags override values from the configuration file
fn merge(mut config: RunConfig, cli: &Cli) -> anyhow::Result<RunConfig> {
    if cli.parallel.is_some() {
        config.parallel = cli.parallel;
    }
    if cli.grep.is_some() {
        config.grep = cli.grep.clone();
    }
    if cli.recursive {
        config.recursive = true;
    }
    if !cli.reporter.is_empty() {
        config.reporters = cli.reporter.clone();
    }
    if let Some(options) = &cli.reporter_options {
        config.reporter_options.extend(parse_reporter_options(options)?);
    }
    Ok(config)
}
