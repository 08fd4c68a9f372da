//! Internet Performance Optimizer CLI
//!
//! A command-line tool for benchmarking the local network connection,
//! reviewing saved benchmarks and listing recommended optimizations.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{bench, info, recommend};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Internet Performance Optimizer CLI
#[derive(Parser)]
#[command(name = "ipo")]
#[command(author, version, about = "Benchmark your connection and get tuning recommendations", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long, short, global = true, env = "IPO_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a network benchmark
    Bench(bench::BenchArgs),

    /// Show recommendations for a saved benchmark
    Recommend {
        /// Benchmark artifact (defaults to the most recent one)
        file: Option<PathBuf>,
    },

    /// Show host information and effective configuration
    Info,
}

fn init_tracing(verbose: bool, log_format: LogFormat) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config_path = config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Bench(args) => {
            bench::run_bench(args, config_path.as_deref(), cli.format).await?;
        }
        Commands::Recommend { file } => {
            recommend::show_recommendations(file, config_path.as_deref(), cli.format)?;
        }
        Commands::Info => {
            info::show_info(config_path.as_deref(), cli.format).await?;
        }
    }

    Ok(())
}
