//! Benchmark orchestration
//!
//! A run moves through `Pending -> Running -> {Partial, Complete, Failed}`.
//! Probe order:
//! 1. System inspection and the mandatory baseline ping pass.
//! 2. Throughput then jitter (they share the iperf3 server), concurrently
//!    with the DNS benchmark.
//! 3. Bufferbloat last, so its load does not contend with earlier tests.
//!
//! Optional probe failures are recorded per probe and downgrade the run to
//! `Partial`. Baseline failure, statistics errors and cancellation abort the
//! run without a result.

use crate::config::BenchConfig;
use crate::error::{BenchmarkError, ProbeError};
use crate::models::{
    BenchmarkResult, BufferbloatResult, ProbeKind, ProbeReport, ProbeStatus, RunState,
    SCHEMA_VERSION,
};
use crate::observability::{BenchMetrics, StructuredLogger};
use crate::probes::{
    BufferbloatProbe, DnsProbe, Iperf3, JitterProbe, PingProbe, Platform, SystemInspector,
    ThroughputProbe,
};
use crate::resolver::Resolver;
use crate::runner::ProbeRunner;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// What happened to one probe
enum ProbeOutcome<T> {
    Skipped,
    Succeeded(T, u64),
    Failed(ProbeError, u64),
}

/// Per-run accumulation state. Only the orchestrator writes to it.
struct RunLedger<'a> {
    logger: &'a StructuredLogger,
    metrics: &'a BenchMetrics,
    reports: Vec<ProbeReport>,
    warnings: Vec<String>,
}

impl<'a> RunLedger<'a> {
    fn new(logger: &'a StructuredLogger, metrics: &'a BenchMetrics) -> Self {
        Self {
            logger,
            metrics,
            reports: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record the outcome and hand back the data, if any
    fn settle<T>(&mut self, probe: ProbeKind, outcome: ProbeOutcome<T>) -> Option<T> {
        match outcome {
            ProbeOutcome::Skipped => {
                self.logger.log_probe_finished(probe, ProbeStatus::Skipped, 0);
                self.reports.push(ProbeReport {
                    probe,
                    status: ProbeStatus::Skipped,
                    duration_ms: 0,
                    error_kind: None,
                    message: None,
                });
                None
            }
            ProbeOutcome::Succeeded(value, duration_ms) => {
                self.metrics
                    .observe_probe_duration(probe, duration_ms as f64 / 1000.0);
                self.logger
                    .log_probe_finished(probe, ProbeStatus::Succeeded, duration_ms);
                self.reports.push(ProbeReport {
                    probe,
                    status: ProbeStatus::Succeeded,
                    duration_ms,
                    error_kind: None,
                    message: None,
                });
                Some(value)
            }
            ProbeOutcome::Failed(error, duration_ms) => {
                self.metrics
                    .observe_probe_duration(probe, duration_ms as f64 / 1000.0);
                self.metrics.inc_probe_failure(probe, &error);
                self.logger.log_probe_failed(probe, &error, duration_ms);
                self.warnings.push(format!("{}: {}", probe, error));
                self.reports.push(ProbeReport {
                    probe,
                    status: ProbeStatus::Failed,
                    duration_ms,
                    error_kind: Some(error.kind().to_string()),
                    message: Some(error.to_string()),
                });
                None
            }
        }
    }

    fn any_failed(&self) -> bool {
        self.reports.iter().any(|r| r.status == ProbeStatus::Failed)
    }
}

/// Time a probe, or skip it when disabled
async fn attempt<T, F, Fut>(enabled: bool, probe: F) -> ProbeOutcome<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ProbeError>>,
{
    if !enabled {
        return ProbeOutcome::Skipped;
    }
    let start = Instant::now();
    let outcome = probe().await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(value) => ProbeOutcome::Succeeded(value, elapsed_ms),
        Err(e) => ProbeOutcome::Failed(e, elapsed_ms),
    }
}

/// Runs probes against one target and assembles a `BenchmarkResult`
pub struct BenchmarkOrchestrator {
    config: Arc<BenchConfig>,
    runner: Arc<dyn ProbeRunner>,
    resolver: Arc<dyn Resolver>,
    inspector: SystemInspector,
    platform: Platform,
    metrics: BenchMetrics,
    state: watch::Sender<RunState>,
}

impl BenchmarkOrchestrator {
    pub fn new(
        config: Arc<BenchConfig>,
        runner: Arc<dyn ProbeRunner>,
        resolver: Arc<dyn Resolver>,
        metrics: BenchMetrics,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Pending);
        Self {
            config,
            runner,
            resolver,
            inspector: SystemInspector::new(),
            platform: Platform::current(),
            metrics,
            state,
        }
    }

    /// Use a custom system inspector (for testing)
    pub fn with_inspector(mut self, inspector: SystemInspector) -> Self {
        self.inspector = inspector;
        self
    }

    /// Override the detected ping syntax (for testing)
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn metrics(&self) -> &BenchMetrics {
        &self.metrics
    }

    /// Current state of the latest run
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    fn transition(&self, next: RunState) {
        let previous = self.state.send_replace(next);
        debug!(from = %previous, to = %next, "Run state changed");
    }

    /// Probes that will run, in execution order
    pub fn enabled_probes(&self) -> Vec<ProbeKind> {
        let selection = &self.config.probes;
        let mut probes = vec![ProbeKind::Ping];
        if selection.throughput {
            probes.push(ProbeKind::Throughput);
        }
        if selection.jitter {
            probes.push(ProbeKind::Jitter);
        }
        if selection.dns {
            probes.push(ProbeKind::Dns);
        }
        if selection.bufferbloat {
            probes.push(ProbeKind::Bufferbloat);
        }
        probes
    }

    /// Execute one run. Cancelling `cancel` drops every in-flight probe,
    /// which terminates its external process, and fails the run with
    /// `BenchmarkError::Cancelled`.
    pub async fn run(&self, cancel: CancellationToken) -> Result<BenchmarkResult, BenchmarkError> {
        let logger = StructuredLogger::new(self.config.target.clone());
        self.transition(RunState::Pending);

        if let Err(e) = self.config.validate() {
            return Err(self.fail(&logger, e));
        }

        self.transition(RunState::Running);
        logger.log_benchmark_started(&self.enabled_probes());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(BenchmarkError::Cancelled),
            result = self.execute(&logger) => result,
        };

        match outcome {
            Ok(result) => {
                self.transition(result.state);
                self.metrics.inc_run(result.state);
                self.metrics.record_result(&result);
                logger.log_benchmark_finished(result.state, result.duration_ms, result.warnings.len());
                Ok(result)
            }
            Err(e) => Err(self.fail(&logger, e)),
        }
    }

    fn fail(&self, logger: &StructuredLogger, error: BenchmarkError) -> BenchmarkError {
        self.transition(RunState::Failed);
        self.metrics.inc_run(RunState::Failed);
        logger.log_benchmark_failed(&error.to_string());
        error
    }

    async fn execute(&self, logger: &StructuredLogger) -> Result<BenchmarkResult, BenchmarkError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let config = &self.config;
        let selection = &config.probes;
        let mut ledger = RunLedger::new(logger, &self.metrics);

        let system_info = self.inspector.inspect().await;

        let ping = PingProbe::new(config.target.clone(), config.ping.clone(), self.runner.clone())
            .with_platform(self.platform);
        let iperf = Iperf3::new(config.iperf.clone(), self.runner.clone());

        let ping_start = Instant::now();
        let baseline = ping.measure().await;
        let ping_ms = ping_start.elapsed().as_millis() as u64;
        let icmp = match baseline {
            Ok(transcript) => {
                ledger.settle(ProbeKind::Ping, ProbeOutcome::Succeeded((), ping_ms));
                transcript.summarize()?
            }
            Err(error) => {
                ledger.settle(ProbeKind::Ping, ProbeOutcome::<()>::Failed(error.clone(), ping_ms));
                return Err(BenchmarkError::BaselineFailed(error));
            }
        };

        let throughput_probe = ThroughputProbe::new(iperf.clone(), config.iperf.duration());
        let jitter_probe = JitterProbe::new(iperf.clone());
        let dns_probe = DnsProbe::new(config.dns.clone(), self.resolver.clone());

        // Throughput and jitter share the iperf3 server, so they run back to
        // back; DNS has no shared resource and overlaps with both
        let load_tests = async {
            let throughput = attempt(selection.throughput, || throughput_probe.run()).await;
            let jitter = attempt(selection.jitter, || jitter_probe.run()).await;
            (throughput, jitter)
        };
        let dns_test = attempt(selection.dns, || async {
            Ok::<_, ProbeError>(dns_probe.run().await)
        });
        let ((throughput, jitter), dns) = tokio::join!(load_tests, dns_test);

        let throughput = ledger
            .settle(ProbeKind::Throughput, throughput)
            .unwrap_or_default();
        let jitter = ledger.settle(ProbeKind::Jitter, jitter).unwrap_or_default();
        let dns = match ledger.settle(ProbeKind::Dns, dns) {
            Some(results) => results?,
            None => Vec::new(),
        };

        let bufferbloat_probe =
            BufferbloatProbe::new(ping.clone(), iperf, config.bufferbloat.clone());
        let bufferbloat = attempt(selection.bufferbloat, || bufferbloat_probe.measure()).await;
        let bufferbloat = match ledger.settle(ProbeKind::Bufferbloat, bufferbloat) {
            Some(samples) => samples.evaluate(&config.bufferbloat)?,
            None => BufferbloatResult::unknown(),
        };

        let state = if ledger.any_failed() {
            RunState::Partial
        } else {
            RunState::Complete
        };

        Ok(BenchmarkResult {
            schema_version: SCHEMA_VERSION,
            timestamp: started_at,
            target: config.target.clone(),
            state,
            duration_ms: start.elapsed().as_millis() as u64,
            system_info,
            icmp,
            throughput,
            jitter,
            bufferbloat,
            dns,
            probes: ledger.reports,
            warnings: ledger.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BufferbloatConfig, DnsConfig, PingConfig, ProbeSelection};
    use crate::models::BufferbloatGrade;
    use crate::probes::iperf_fixtures::{tcp_report, udp_report};
    use crate::resolver::Resolution;
    use crate::runner::mock::{ok, ScriptedRunner};
    use crate::runner::CommandOutput;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::time::Duration;

    /// Every resolver answers in 10 ms
    struct StaticResolver;

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve(
            &self,
            _hostname: &str,
            _server: IpAddr,
            _timeout: Duration,
        ) -> Result<Resolution, ProbeError> {
            Ok(Resolution {
                ip: "93.184.216.34".parse().unwrap(),
                elapsed_ms: 10.0,
            })
        }
    }

    fn ping_replies(argv: &[String]) -> Option<Result<CommandOutput, ProbeError>> {
        if argv[0] != "ping" {
            return None;
        }
        let count: usize = argv[2].parse().unwrap();
        let mut out = String::new();
        for seq in 0..count {
            out.push_str(&format!(
                "64 bytes from 1.1.1.1: icmp_seq={} ttl=57 time={} ms\n",
                seq + 1,
                12.0 + (seq % 3) as f64
            ));
        }
        out.push_str(&format!("{} packets transmitted, {} received, 0% packet loss\n", count, count));
        ok(out)
    }

    fn iperf_reports(argv: &[String]) -> Option<Result<CommandOutput, ProbeError>> {
        if argv[0] != "iperf3" {
            return None;
        }
        if argv.iter().any(|a| a == "-u") {
            ok(udp_report(2.5, 0.4))
        } else {
            ok(tcp_report(94_000_000.0, 3))
        }
    }

    fn config(probes: ProbeSelection) -> Arc<BenchConfig> {
        Arc::new(BenchConfig {
            ping: PingConfig {
                count: 10,
                ..Default::default()
            },
            dns: DnsConfig {
                repeats: 2,
                ..Default::default()
            },
            bufferbloat: BufferbloatConfig {
                idle_samples: 5,
                ramp_up_ms: 10,
                sample_interval_ms: 5,
                ..Default::default()
            },
            probes,
            ..Default::default()
        })
    }

    fn orchestrator(config: Arc<BenchConfig>, runner: ScriptedRunner) -> BenchmarkOrchestrator {
        BenchmarkOrchestrator::new(
            config,
            Arc::new(runner),
            Arc::new(StaticResolver),
            BenchMetrics::new().unwrap(),
        )
        .with_platform(Platform::Unix)
        .with_inspector(SystemInspector::with_paths("/nonexistent/proc", "/nonexistent/sys"))
    }

    fn statuses(result: &BenchmarkResult) -> Vec<(ProbeKind, ProbeStatus)> {
        result.probes.iter().map(|r| (r.probe, r.status)).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_complete_run() {
        let runner = ScriptedRunner::new()
            .on(ping_replies)
            .on_delayed(Duration::from_millis(100), iperf_reports);
        let orchestrator = orchestrator(config(ProbeSelection::default()), runner);

        let result = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, RunState::Complete);
        assert_eq!(orchestrator.state(), RunState::Complete);
        assert_eq!(result.schema_version, SCHEMA_VERSION);
        assert!(result.warnings.is_empty());
        assert_eq!(result.icmp.samples, 10);
        assert_eq!(result.icmp.packet_loss, 0.0);
        assert!((result.throughput.download_mbps - 94.0).abs() < 1e-9);
        assert_eq!(result.throughput.retransmits, 6);
        assert_eq!(result.jitter.mean_jitter_ms, 2.5);
        assert_eq!(result.dns.len(), 4);
        assert!(result.dns.iter().all(|d| d.reachable));
        assert_ne!(result.bufferbloat.grade, BufferbloatGrade::Unknown);
        assert!(result.bufferbloat.loaded_samples > 0);
        assert!(result.system_info.nic.is_none());
        assert!(statuses(&result)
            .iter()
            .all(|(_, status)| *status == ProbeStatus::Succeeded));
    }

    #[tokio::test]
    async fn test_baseline_unavailable_fails_run() {
        let runner = ScriptedRunner::new().on(iperf_reports);
        let orchestrator = orchestrator(config(ProbeSelection::default()), runner);

        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, BenchmarkError::BaselineFailed(ProbeError::Unavailable(_))));
        assert_eq!(orchestrator.state(), RunState::Failed);
        let metrics = orchestrator.metrics().render().unwrap();
        assert!(metrics.contains("ipo_runs_total{state=\"failed\"} 1"));
        assert!(metrics.contains("ipo_probe_failures_total{kind=\"unavailable\",probe=\"ping\"} 1"));
    }

    #[tokio::test]
    async fn test_baseline_failure_runs_nothing_else() {
        let runner = Arc::new(ScriptedRunner::new().on(iperf_reports));
        let orchestrator = BenchmarkOrchestrator::new(
            config(ProbeSelection::default()),
            runner.clone(),
            Arc::new(StaticResolver),
            BenchMetrics::new().unwrap(),
        )
        .with_platform(Platform::Unix);

        assert!(orchestrator.run(CancellationToken::new()).await.is_err());
        assert_eq!(runner.call_count("iperf3"), 0);
    }

    #[tokio::test]
    async fn test_throughput_timeout_yields_partial() {
        let runner = ScriptedRunner::new().on(ping_replies).on(|argv: &[String]| {
            if argv[0] != "iperf3" {
                None
            } else if argv.iter().any(|a| a == "-u") {
                ok(udp_report(3.0, 1.0))
            } else {
                Some(Err(ProbeError::Timeout(Duration::from_secs(35))))
            }
        });
        let selection = ProbeSelection {
            bufferbloat: false,
            ..Default::default()
        };
        let orchestrator = orchestrator(config(selection), runner);

        let result = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, RunState::Partial);
        assert_eq!(result.throughput.download_mbps, 0.0);
        assert_eq!(result.throughput.upload_mbps, 0.0);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("throughput:"));
        assert_eq!(result.jitter.mean_jitter_ms, 3.0);
        assert_eq!(result.dns.len(), 4);
        assert_eq!(result.icmp.samples, 10);
        assert_eq!(result.bufferbloat.grade, BufferbloatGrade::Unknown);

        let throughput = result.probe_report(ProbeKind::Throughput).unwrap();
        assert_eq!(throughput.status, ProbeStatus::Failed);
        assert_eq!(throughput.error_kind.as_deref(), Some("timeout"));
        assert_eq!(
            result.probe_report(ProbeKind::Bufferbloat).unwrap().status,
            ProbeStatus::Skipped
        );
        assert!(orchestrator
            .metrics()
            .render()
            .unwrap()
            .contains("ipo_runs_total{state=\"partial\"} 1"));
    }

    #[tokio::test]
    async fn test_skipped_probes() {
        let runner = ScriptedRunner::new().on(ping_replies);
        let selection = ProbeSelection {
            throughput: false,
            jitter: false,
            dns: false,
            bufferbloat: false,
        };
        let orchestrator = orchestrator(config(selection), runner);
        assert_eq!(orchestrator.enabled_probes(), vec![ProbeKind::Ping]);

        let result = orchestrator.run(CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, RunState::Complete);
        assert_eq!(
            statuses(&result),
            vec![
                (ProbeKind::Ping, ProbeStatus::Succeeded),
                (ProbeKind::Throughput, ProbeStatus::Skipped),
                (ProbeKind::Jitter, ProbeStatus::Skipped),
                (ProbeKind::Dns, ProbeStatus::Skipped),
                (ProbeKind::Bufferbloat, ProbeStatus::Skipped),
            ]
        );
        assert!(result.dns.is_empty());
        assert_eq!(result.throughput.download_mbps, 0.0);
        assert_eq!(result.bufferbloat.grade, BufferbloatGrade::Unknown);
    }

    #[tokio::test]
    async fn test_all_pings_lost_still_yields_result() {
        let runner = ScriptedRunner::new().on(|argv: &[String]| {
            if argv[0] == "ping" {
                ok("10 packets transmitted, 0 received, 100% packet loss\n")
            } else {
                None
            }
        });
        let selection = ProbeSelection {
            throughput: false,
            jitter: false,
            dns: false,
            bufferbloat: false,
        };
        let orchestrator = orchestrator(config(selection), runner);

        let result = orchestrator.run(CancellationToken::new()).await.unwrap();
        assert_eq!(result.icmp.packet_loss, 100.0);
        assert_eq!(result.icmp.p50, 0.0);
    }

    #[tokio::test]
    async fn test_cancellation_discards_completed_probes() {
        let runner = ScriptedRunner::new()
            .on(ping_replies)
            .on_delayed(Duration::from_secs(30), iperf_reports);
        let orchestrator = orchestrator(config(ProbeSelection::default()), runner);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(5), orchestrator.run(cancel))
            .await
            .unwrap();

        assert!(matches!(outcome, Err(BenchmarkError::Cancelled)));
        assert_eq!(orchestrator.state(), RunState::Failed);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = BenchConfig::default();
        config.ping.count = 0;
        let orchestrator = orchestrator(Arc::new(config), ScriptedRunner::new().on(ping_replies));

        let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BenchmarkError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_state_transitions_are_observable() {
        let runner = ScriptedRunner::new().on_delayed(Duration::from_millis(50), ping_replies);
        let selection = ProbeSelection {
            throughput: false,
            jitter: false,
            dns: false,
            bufferbloat: false,
        };
        let orchestrator = orchestrator(config(selection), runner);
        let mut states = orchestrator.subscribe();
        assert_eq!(*states.borrow(), RunState::Pending);

        let run = orchestrator.run(CancellationToken::new());
        tokio::pin!(run);
        tokio::select! {
            _ = &mut run => panic!("run finished before entering Running"),
            _ = states.wait_for(|s| *s == RunState::Running) => {}
        }
        assert!(run.await.is_ok());
        assert_eq!(orchestrator.state(), RunState::Complete);
    }
}
