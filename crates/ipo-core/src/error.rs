//! Error taxonomy for probes, statistics and benchmark runs

use std::time::Duration;
use thiserror::Error;

/// Failure of a single measurement probe.
///
/// All variants are recoverable for optional probes: the orchestrator
/// downgrades them to a warning and substitutes a zeroed result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProbeError {
    /// External tool missing or unusable (binary not found, raw socket
    /// permission denied, server refused the test)
    #[error("probe unavailable: {0}")]
    Unavailable(String),

    /// External process exceeded its wall-clock bound
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// External output did not match the expected format
    #[error("unexpected probe output: {0}")]
    Parse(String),
}

impl ProbeError {
    /// Short label used in warnings and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Unavailable(_) => "unavailable",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::Parse(_) => "parse",
        }
    }
}

/// Usage errors in the sample statistics functions. These indicate a bug in
/// the caller and are never swallowed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StatsError {
    #[error("cannot compute a statistic over an empty sample set")]
    EmptyInput,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Fatal outcome of a benchmark run. A run that ends with one of these
/// yields no `BenchmarkResult`.
#[derive(Debug, Error)]
pub enum BenchmarkError {
    /// The mandatory baseline latency probe failed
    #[error("baseline latency probe failed: {0}")]
    BaselineFailed(#[source] ProbeError),

    /// The run was cancelled by the caller
    #[error("benchmark cancelled")]
    Cancelled,

    #[error("statistics error: {0}")]
    Statistics(#[from] StatsError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while saving or loading benchmark artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}
