//! Observability for benchmark runs
//!
//! Provides:
//! - Prometheus metrics (probe durations, failures, run outcomes, headline results)
//! - Structured event logging with tracing

use crate::error::ProbeError;
use crate::models::{BenchmarkResult, ProbeKind, ProbeStatus, RunState};
use crate::recommend::Recommendation;
use prometheus::{
    Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use tracing::{info, warn};

/// Histogram buckets for probe durations (in seconds)
const PROBE_DURATION_BUCKETS: &[f64] = &[
    0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0,
];

/// Benchmark metrics for Prometheus exposition.
///
/// Every instance owns its registry, so concurrent runs in one process
/// never share counters. Clones share the same underlying metrics.
#[derive(Clone)]
pub struct BenchMetrics {
    registry: Registry,
    probe_duration_seconds: HistogramVec,
    probe_failures: IntCounterVec,
    runs: IntCounterVec,
    latency_ms: GaugeVec,
    packet_loss_percent: Gauge,
    bufferbloat_delta_ms: Gauge,
    throughput_mbps: GaugeVec,
}

impl BenchMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let probe_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "ipo_probe_duration_seconds",
                "Wall-clock time spent in each probe",
            )
            .buckets(PROBE_DURATION_BUCKETS.to_vec()),
            &["probe"],
        )?;
        let probe_failures = IntCounterVec::new(
            Opts::new("ipo_probe_failures_total", "Probe failures by probe and error kind"),
            &["probe", "kind"],
        )?;
        let runs = IntCounterVec::new(
            Opts::new("ipo_runs_total", "Benchmark runs by terminal state"),
            &["state"],
        )?;
        let latency_ms = GaugeVec::new(
            Opts::new("ipo_latency_ms", "Baseline ICMP latency percentiles"),
            &["quantile"],
        )?;
        let packet_loss_percent =
            Gauge::new("ipo_packet_loss_percent", "Baseline ICMP packet loss")?;
        let bufferbloat_delta_ms =
            Gauge::new("ipo_bufferbloat_delta_ms", "Loaded minus idle latency")?;
        let throughput_mbps = GaugeVec::new(
            Opts::new("ipo_throughput_mbps", "Measured TCP throughput"),
            &["direction"],
        )?;

        registry.register(Box::new(probe_duration_seconds.clone()))?;
        registry.register(Box::new(probe_failures.clone()))?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(latency_ms.clone()))?;
        registry.register(Box::new(packet_loss_percent.clone()))?;
        registry.register(Box::new(bufferbloat_delta_ms.clone()))?;
        registry.register(Box::new(throughput_mbps.clone()))?;

        Ok(Self {
            registry,
            probe_duration_seconds,
            probe_failures,
            runs,
            latency_ms,
            packet_loss_percent,
            bufferbloat_delta_ms,
            throughput_mbps,
        })
    }

    /// Record the duration of a probe that ran (succeeded or failed)
    pub fn observe_probe_duration(&self, probe: ProbeKind, duration_secs: f64) {
        self.probe_duration_seconds
            .with_label_values(&[probe.as_str()])
            .observe(duration_secs);
    }

    pub fn inc_probe_failure(&self, probe: ProbeKind, error: &ProbeError) {
        self.probe_failures
            .with_label_values(&[probe.as_str(), error.kind()])
            .inc();
    }

    pub fn inc_run(&self, state: RunState) {
        self.runs.with_label_values(&[state.as_str()]).inc();
    }

    /// Publish the headline numbers of a finished run. Probes without data
    /// leave their gauges untouched.
    pub fn record_result(&self, result: &BenchmarkResult) {
        if result.probe_succeeded(ProbeKind::Ping) {
            let icmp = &result.icmp;
            let quantiles = [
                ("0.5", icmp.p50),
                ("0.9", icmp.p90),
                ("0.95", icmp.p95),
                ("0.99", icmp.p99),
            ];
            for (quantile, value) in quantiles {
                self.latency_ms.with_label_values(&[quantile]).set(value);
            }
            self.packet_loss_percent.set(icmp.packet_loss);
        }
        if result.probe_succeeded(ProbeKind::Bufferbloat) {
            self.bufferbloat_delta_ms.set(result.bufferbloat.delta_ms());
        }
        if result.probe_succeeded(ProbeKind::Throughput) {
            self.throughput_mbps
                .with_label_values(&["download"])
                .set(result.throughput.download_mbps);
            self.throughput_mbps
                .with_label_values(&["upload"])
                .set(result.throughput.upload_mbps);
        }
    }

    /// Prometheus text exposition of every metric
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Structured logger for benchmark events
///
/// Every event carries an `event` field and the run's target so log
/// pipelines can filter on them.
#[derive(Clone)]
pub struct StructuredLogger {
    target_host: String,
}

impl StructuredLogger {
    pub fn new(target_host: impl Into<String>) -> Self {
        Self {
            target_host: target_host.into(),
        }
    }

    /// Log the start of a run with the probes it will execute
    pub fn log_benchmark_started(&self, enabled_probes: &[ProbeKind]) {
        let probes: Vec<&str> = enabled_probes.iter().map(ProbeKind::as_str).collect();
        info!(
            event = "benchmark_started",
            target_host = %self.target_host,
            probes = %probes.join(","),
            "Benchmark started"
        );
    }

    /// Log a probe that succeeded or was skipped
    pub fn log_probe_finished(&self, probe: ProbeKind, status: ProbeStatus, duration_ms: u64) {
        info!(
            event = "probe_finished",
            target_host = %self.target_host,
            probe = %probe,
            status = ?status,
            duration_ms = duration_ms,
            "Probe finished"
        );
    }

    pub fn log_probe_failed(&self, probe: ProbeKind, error: &ProbeError, duration_ms: u64) {
        warn!(
            event = "probe_failed",
            target_host = %self.target_host,
            probe = %probe,
            error_kind = error.kind(),
            error = %error,
            duration_ms = duration_ms,
            "Probe failed"
        );
    }

    pub fn log_benchmark_finished(&self, state: RunState, duration_ms: u64, warnings: usize) {
        info!(
            event = "benchmark_finished",
            target_host = %self.target_host,
            state = %state,
            duration_ms = duration_ms,
            warnings = warnings,
            "Benchmark finished"
        );
    }

    pub fn log_benchmark_failed(&self, reason: &str) {
        warn!(
            event = "benchmark_failed",
            target_host = %self.target_host,
            reason = %reason,
            "Benchmark failed"
        );
    }

    pub fn log_recommendation(&self, recommendation: &Recommendation) {
        info!(
            event = "recommendation_emitted",
            target_host = %self.target_host,
            id = %recommendation.id,
            category = ?recommendation.category,
            confidence = ?recommendation.confidence,
            risk_level = ?recommendation.risk_level,
            "Recommendation emitted"
        );
    }
}
