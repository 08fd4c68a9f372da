//! `ipo recommend`: recommendations for a saved benchmark

use anyhow::{Context, Result};
use ipo_core::{ArtifactStore, RecommendationEngine, StructuredLogger};
use serde_json::json;
use std::path::{Path, PathBuf};

use crate::config::{default_store, load_config};
use crate::output::{print_info, print_json, print_recommendations, print_warning, OutputFormat};

/// Evaluate the rules against an artifact, or the latest one
pub fn show_recommendations(
    file: Option<PathBuf>,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => default_store()?
            .latest()
            .context("Failed to list benchmark artifacts")?
            .context("No saved benchmarks found; run `ipo bench` first")?,
    };

    let result = ArtifactStore::load(&path)
        .with_context(|| format!("Failed to load benchmark {}", path.display()))?;
    let config = load_config(config_path)?;

    let recommendations = RecommendationEngine::new(config.thresholds).evaluate(&result);
    let logger = StructuredLogger::new(result.target.clone());
    for recommendation in &recommendations {
        logger.log_recommendation(recommendation);
    }

    match format {
        OutputFormat::Json => print_json(&json!({
            "source": path.display().to_string(),
            "recommendations": recommendations,
        }))?,
        OutputFormat::Table => {
            print_info(&format!(
                "Benchmark of {} from {} ({})",
                result.target,
                result.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                path.display()
            ));
            for warning in &result.warnings {
                print_warning(warning);
            }
            print_recommendations(&recommendations);
        }
    }

    Ok(())
}
