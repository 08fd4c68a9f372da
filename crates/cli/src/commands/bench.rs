//! `ipo bench`: run a benchmark, save it and optionally recommend

use anyhow::{Context, Result};
use clap::Args;
use ipo_core::config::BenchConfig;
use ipo_core::{
    ArtifactStore, BenchMetrics, BenchmarkOrchestrator, BenchmarkResult, HickoryResolver,
    ProcessRunner, RecommendationEngine, StructuredLogger,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{default_store, load_config};
use crate::output::{
    print_info, print_json, print_recommendations, print_result, print_success, OutputFormat,
};

#[derive(Debug, Args)]
pub struct BenchArgs {
    /// Host to measure latency against (overrides the configured target)
    pub target: Option<String>,

    /// Baseline ping round trips
    #[arg(long, short = 'n')]
    pub count: Option<u32>,

    /// iperf3 server for throughput, jitter and bufferbloat tests
    #[arg(long)]
    pub iperf_server: Option<String>,

    #[arg(long)]
    pub skip_throughput: bool,

    #[arg(long)]
    pub skip_jitter: bool,

    #[arg(long)]
    pub skip_dns: bool,

    #[arg(long)]
    pub skip_bufferbloat: bool,

    /// Write the result to this file instead of the artifact directory
    #[arg(long, short, conflicts_with = "output_dir")]
    pub output: Option<PathBuf>,

    /// Artifact directory (default ~/.ipo/benchmarks)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Do not save the result
    #[arg(long, conflicts_with_all = ["output", "output_dir"])]
    pub no_save: bool,

    /// Write Prometheus metrics of the run to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Also print recommendations for the result
    #[arg(long, short)]
    pub recommend: bool,
}

/// Apply command-line overrides on top of file and environment settings
pub fn apply_overrides(config: &mut BenchConfig, args: &BenchArgs) {
    if let Some(target) = &args.target {
        config.target = target.clone();
    }
    if let Some(count) = args.count {
        config.ping.count = count;
    }
    if let Some(server) = &args.iperf_server {
        config.iperf.server = server.clone();
    }
    if args.skip_throughput {
        config.probes.throughput = false;
    }
    if args.skip_jitter {
        config.probes.jitter = false;
    }
    if args.skip_dns {
        config.probes.dns = false;
    }
    if args.skip_bufferbloat {
        config.probes.bufferbloat = false;
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling benchmark");
            token.cancel();
        }
    });
}

fn save_result(result: &BenchmarkResult, args: &BenchArgs) -> Result<Option<PathBuf>> {
    if args.no_save {
        return Ok(None);
    }
    let path = match (&args.output, &args.output_dir) {
        (Some(path), _) => {
            ArtifactStore::save_to(result, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            path.clone()
        }
        (None, Some(dir)) => ArtifactStore::new(dir)
            .save(result)
            .context("Failed to save benchmark artifact")?,
        (None, None) => default_store()?
            .save(result)
            .context("Failed to save benchmark artifact")?,
    };
    Ok(Some(path))
}

fn write_metrics(metrics: &BenchMetrics, path: &Path) -> Result<()> {
    let text = metrics.render().context("Failed to encode metrics")?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}

/// Run a benchmark
pub async fn run_bench(
    args: BenchArgs,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, &args);
    let config = Arc::new(config);

    let metrics = BenchMetrics::new().context("Failed to create metrics registry")?;
    let orchestrator = BenchmarkOrchestrator::new(
        config.clone(),
        Arc::new(ProcessRunner::new()),
        Arc::new(HickoryResolver::from_system()),
        metrics,
    );

    if let OutputFormat::Table = format {
        let probes: Vec<&str> = orchestrator
            .enabled_probes()
            .iter()
            .map(|p| p.as_str())
            .collect();
        print_info(&format!(
            "Benchmarking {} ({}), press Ctrl-C to cancel",
            config.target,
            probes.join(", ")
        ));
    }

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let outcome = orchestrator.run(cancel).await;

    // Metrics also describe failed runs
    if let Some(path) = &args.metrics_file {
        write_metrics(orchestrator.metrics(), path)?;
    }

    let result = outcome.context("Benchmark failed")?;
    let saved = save_result(&result, &args)?;

    let recommendations = if args.recommend {
        let engine = RecommendationEngine::new(config.thresholds.clone());
        let recommendations = engine.evaluate(&result);
        let logger = StructuredLogger::new(result.target.clone());
        for recommendation in &recommendations {
            logger.log_recommendation(recommendation);
        }
        Some(recommendations)
    } else {
        None
    };

    match format {
        OutputFormat::Json => match &recommendations {
            Some(recommendations) => print_json(&json!({
                "result": result,
                "recommendations": recommendations,
            }))?,
            None => print_json(&result)?,
        },
        OutputFormat::Table => {
            print_result(&result);
            if let Some(path) = &saved {
                print_success(&format!("Saved to {}", path.display()));
            }
            if let Some(recommendations) = &recommendations {
                print_recommendations(recommendations);
            }
        }
    }

    Ok(())
}
