//! Run configuration
//!
//! `RunConfig` is what users write (`specline.toml` or CLI flags);
//! `RunOptions` is its validated form handed to the launcher.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Hard upper bound on concurrently running suites
pub const MAX_PARALLEL_LIMIT: usize = 24;

/// Reporter attached to every run
pub const DEFAULT_REPORTER: &str = "specs";

/// Run configuration as written by the user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Concurrency ceiling; absent means sequential
    pub parallel: Option<usize>,

    /// Spec name filter, `/pattern/flags` or a bare pattern
    pub grep: Option<String>,

    /// Recurse into directories when discovering suites
    pub recursive: bool,

    /// Reporter names; `specs` is always added
    pub reporters: Vec<String>,

    pub reporter_options: BTreeMap<String, String>,
}

impl RunConfig {
    /// Load configuration from file, or defaults if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| {
                Error::InvalidRunConfiguration(format!(
                    "invalid configuration file '{}': {e}",
                    path.display()
                ))
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Validate into launcher options
    pub fn options(&self) -> Result<RunOptions> {
        let parallel = validate_parallel(self.parallel)?;
        let filter = self.grep.as_deref().map(SpecFilter::parse).transpose()?;

        let mut reporters: Vec<String> = Vec::new();
        for name in self
            .reporters
            .iter()
            .map(|r| r.trim().to_string())
            .chain(std::iter::once(DEFAULT_REPORTER.to_string()))
        {
            if !name.is_empty() && !reporters.contains(&name) {
                reporters.push(name);
            }
        }

        Ok(RunOptions {
            parallel,
            filter,
            reporters,
            reporter_options: self.reporter_options.clone(),
        })
    }
}

/// Validated run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub parallel: usize,
    pub filter: Option<SpecFilter>,
    pub reporters: Vec<String>,
    pub reporter_options: BTreeMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: 1,
            filter: None,
            reporters: vec![DEFAULT_REPORTER.to_string()],
            reporter_options: BTreeMap::new(),
        }
    }
}

impl RunOptions {
    /// Set a user-requested ceiling; same rule as the `parallel` setting,
    /// so an explicit `1` is rejected even though it is the default.
    pub fn with_parallel(mut self, parallel: usize) -> Result<Self> {
        self.parallel = validate_parallel(Some(parallel))?;
        Ok(self)
    }

    pub fn with_filter(mut self, filter: SpecFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// User-facing rule: absent means 1; an explicit value must be in
/// `(1, MAX_PARALLEL_LIMIT]`.
pub fn validate_parallel(parallel: Option<usize>) -> Result<usize> {
    match parallel {
        None => Ok(1),
        Some(1) => Err(invalid_parallel(1)),
        Some(n) => check_ceiling(n),
    }
}

/// Ceiling the launcher can run with: `[1, MAX_PARALLEL_LIMIT]`.
///
/// Wider than [`validate_parallel`] because `1` is the sequential default
/// that options built in code carry.
pub fn check_ceiling(parallel: usize) -> Result<usize> {
    if (1..=MAX_PARALLEL_LIMIT).contains(&parallel) {
        Ok(parallel)
    } else {
        Err(invalid_parallel(parallel))
    }
}

fn invalid_parallel(n: usize) -> Error {
    Error::InvalidRunConfiguration(format!(
        "Given argument for parallel option {n} is invalid, Please provide a number (> 1 and <= {MAX_PARALLEL_LIMIT})"
    ))
}

/// Spec name filter
#[derive(Debug, Clone)]
pub struct SpecFilter {
    pattern: Regex,
}

impl SpecFilter {
    /// Parse `/pattern/`, `/pattern/i`, `/pattern/g` or a bare pattern.
    ///
    /// Only `i` changes matching. Any other flag text, including `gi`, makes
    /// the whole input a bare pattern.
    pub fn parse(input: &str) -> Result<Self> {
        let (pattern, insensitive) = match input
            .strip_prefix('/')
            .and_then(|rest| rest.rsplit_once('/'))
        {
            Some((pattern, "")) | Some((pattern, "g")) => (pattern, false),
            Some((pattern, "i")) => (pattern, true),
            _ => (input, false),
        };

        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(insensitive)
            .build()
            .map_err(|e| Error::InvalidRunConfiguration(format!("invalid grep pattern '{input}': {e}")))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }
}

/// Parse `k=v,k2=v2`; a bare `k` means `true`
pub fn parse_reporter_options(input: &str) -> Result<BTreeMap<String, String>> {
    let mut options = BTreeMap::new();

    for option in input.split(',').filter(|o| !o.trim().is_empty()) {
        let parts: Vec<&str> = option.split('=').collect();
        match parts.as_slice() {
            [key] => {
                options.insert(key.trim().to_string(), "true".to_string());
            }
            [key, value] => {
                options.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => {
                return Err(Error::InvalidRunConfiguration(format!(
                    "invalid reporter option '{option}'"
                )))
            }
        }
    }

    Ok(options)
}
