//! File locations used by the CLI

use anyhow::{Context, Result};
use ipo_core::{ArtifactStore, BenchConfig};
use std::path::{Path, PathBuf};

/// `~/.config/ipo/config.toml`
fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".config").join("ipo").join("config.toml"))
}

/// The explicit `--config` path, else the default file when it exists
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|path| path.exists()),
    }
}

/// Load benchmark configuration with environment overrides
pub fn load_config(path: Option<&Path>) -> Result<BenchConfig> {
    BenchConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })
}

/// Artifact store in `~/.ipo/benchmarks`
pub fn default_store() -> Result<ArtifactStore> {
    let home = dirs_next::home_dir().context("Could not determine home directory")?;
    Ok(ArtifactStore::under_home(&home))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_path_wins() {
        let path = Path::new("/tmp/ipo.toml");
        assert_eq!(resolve_config_path(Some(path)), Some(path.to_path_buf()));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ipo.toml");
        std::fs::write(&path, "target = \"9.9.9.9\"\n[ping]\ncount = 50\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.target, "9.9.9.9");
        assert_eq!(config.ping.count, 50);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Some(Path::new("/nonexistent/ipo.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/ipo.toml"));
    }
}
