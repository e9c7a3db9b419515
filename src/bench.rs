//! bench
//!
//! Compare two benchmark result files and flag mean-time regressions.
//!
//! Result files use the pytest-benchmark JSON layout:
//!
//! ```json
//! {"benchmarks": [{"name": "test_build", "stats": {"mean": 0.12}}]}
//! ```
//!
//! A result file must be an object with a non-empty `benchmarks` list, and
//! every mean must be a positive number. Every benchmark in the head run must
//! also exist in the base run, so a renamed or newly added benchmark fails the
//! comparison instead of being skipped.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::Deserialize;
use thiserror::Error;

/// Largest accepted increase of a benchmark's mean, as a fraction.
pub const DEFAULT_MAX_REGRESSION: f64 = 0.10;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("failed to read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid benchmark results in '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("no benchmarks in '{}'", .0.display())]
    Empty(PathBuf),

    #[error("benchmark '{name}' in '{}' has invalid mean {mean}", .path.display())]
    InvalidMean { path: PathBuf, name: String, mean: f64 },

    #[error("benchmark '{0}' is missing from the base results")]
    MissingBase(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stats {
    pub mean: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Benchmark {
    pub name: String,
    pub stats: Stats,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkReport {
    pub benchmarks: Vec<Benchmark>,
}

impl BenchmarkReport {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let bytes = fs::read(path).map_err(|e| BenchError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let parse = |source| BenchError::Parse {
            path: path.to_path_buf(),
            source,
        };
        let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(parse)?;
        if !value.is_object() {
            return Err(parse(serde_json::Error::custom(
                "expected an object with a `benchmarks` list",
            )));
        }
        let report: Self = serde_json::from_value(value).map_err(parse)?;

        if report.benchmarks.is_empty() {
            return Err(BenchError::Empty(path.to_path_buf()));
        }
        if let Some(b) = report
            .benchmarks
            .iter()
            .find(|b| !b.stats.mean.is_finite() || b.stats.mean <= 0.0)
        {
            return Err(BenchError::InvalidMean {
                path: path.to_path_buf(),
                name: b.name.clone(),
                mean: b.stats.mean,
            });
        }
        Ok(report)
    }

    fn mean(&self, name: &str) -> Option<f64> {
        self.benchmarks
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.stats.mean)
    }
}

/// One benchmark present in both reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub name: String,
    pub base_mean: f64,
    pub head_mean: f64,
    pub regressed: bool,
}

impl Comparison {
    /// Relative change of the mean, `0.05` meaning 5% slower.
    pub fn change(&self) -> f64 {
        self.head_mean / self.base_mean - 1.0
    }
}

/// Compare the benchmarks of `head` with those of `base`. Benchmarks only in
/// `base` are ignored; a benchmark only in `head` is an error.
pub fn compare(
    base: &BenchmarkReport,
    head: &BenchmarkReport,
    max_regression: f64,
) -> Result<Vec<Comparison>, BenchError> {
    head.benchmarks
        .iter()
        .map(|b| {
            let base_mean = base
                .mean(&b.name)
                .ok_or_else(|| BenchError::MissingBase(b.name.clone()))?;
            let head_mean = b.stats.mean;
            Ok(Comparison {
                name: b.name.clone(),
                base_mean,
                head_mean,
                regressed: head_mean > base_mean * (1.0 + max_regression),
            })
        })
        .collect()
}
