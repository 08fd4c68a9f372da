//! Benchmark artifact persistence
//!
//! Results are stored as pretty-printed JSON named
//! `bench_YYYYMMDD_HHMMSS.json`. Writes go to a temp file that is renamed
//! into place, so a crash never leaves a truncated artifact behind.

use crate::error::ArtifactError;
use crate::models::{BenchmarkResult, SCHEMA_VERSION};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const ARTIFACT_PREFIX: &str = "bench_";
const ARTIFACT_EXTENSION: &str = "json";

fn io_error(path: &Path, source: std::io::Error) -> ArtifactError {
    ArtifactError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Directory of benchmark artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<home>/.ipo/benchmarks`
    pub fn under_home(home: &Path) -> Self {
        Self::new(home.join(".ipo").join("benchmarks"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a result, derived from its start time
    pub fn file_name(result: &BenchmarkResult) -> String {
        format!(
            "{}{}.{}",
            ARTIFACT_PREFIX,
            result.timestamp.format("%Y%m%d_%H%M%S"),
            ARTIFACT_EXTENSION
        )
    }

    /// Save into the store directory, returning the artifact path
    pub fn save(&self, result: &BenchmarkResult) -> Result<PathBuf, ArtifactError> {
        let path = self.dir.join(Self::file_name(result));
        Self::save_to(result, &path)?;
        Ok(path)
    }

    /// Save to an explicit path
    pub fn save_to(result: &BenchmarkResult, path: &Path) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(result)?;

        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| io_error(&temp_path, e))?;
        file.write_all(&json).map_err(|e| io_error(&temp_path, e))?;
        file.sync_all().map_err(|e| io_error(&temp_path, e))?;

        fs::rename(&temp_path, path).map_err(|e| io_error(path, e))?;

        info!(path = %path.display(), bytes = json.len(), "Saved benchmark artifact");
        Ok(())
    }

    /// Load an artifact. Older schema versions are accepted; newer ones are
    /// rejected before their body is interpreted.
    pub fn load(path: &Path) -> Result<BenchmarkResult, ArtifactError> {
        let data = fs::read(path).map_err(|e| io_error(path, e))?;
        let value: serde_json::Value = serde_json::from_slice(&data)?;

        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        if found > u64::from(SCHEMA_VERSION) {
            return Err(ArtifactError::UnsupportedSchema {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                supported: SCHEMA_VERSION,
            });
        }

        let result: BenchmarkResult = serde_json::from_value(value)?;
        debug!(path = %path.display(), schema_version = found, "Loaded benchmark artifact");
        Ok(result)
    }

    /// Artifacts in the store, oldest first
    pub fn list(&self) -> Result<Vec<PathBuf>, ArtifactError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e)),
        };

        let mut artifacts: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                name.starts_with(ARTIFACT_PREFIX)
                    && path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
            })
            .collect();
        // Timestamped names sort chronologically
        artifacts.sort();
        Ok(artifacts)
    }

    /// Most recent artifact, if any
    pub fn latest(&self) -> Result<Option<PathBuf>, ArtifactError> {
        Ok(self.list()?.pop())
    }
}
