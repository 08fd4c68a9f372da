//! Core library of the Internet Performance Optimizer
//!
//! This crate provides:
//! - Measurement probes (ping, iperf3 throughput and jitter, DNS, bufferbloat)
//! - Sample statistics over latency distributions
//! - Benchmark orchestration with per-probe failure isolation and cancellation
//! - A rule-based recommendation engine
//! - Artifact persistence, configuration and observability

pub mod artifact;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod orchestrator;
pub mod probes;
pub mod recommend;
pub mod resolver;
pub mod runner;
pub mod stats;

pub use artifact::ArtifactStore;
pub use config::BenchConfig;
pub use error::{ArtifactError, BenchmarkError, ProbeError, StatsError};
pub use models::*;
pub use observability::{BenchMetrics, StructuredLogger};
pub use orchestrator::BenchmarkOrchestrator;
pub use recommend::{Recommendation, RecommendationEngine};
pub use resolver::{HickoryResolver, Resolver};
pub use runner::{ProbeRunner, ProcessRunner};
