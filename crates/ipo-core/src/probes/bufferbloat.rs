//! Bufferbloat probe: latency at idle vs latency while the link is saturated
//!
//! Protocol:
//! 1. Idle pass: a short ping run with no load; its median is the idle latency.
//! 2. A download load run is spawned as its own task. It reports the instant
//!    it starts and the instant it finishes on the shared monotonic clock.
//! 3. The sampler waits for the start signal plus a ramp-up delay, then
//!    issues single pings until the finish signal arrives. Every sample is
//!    stamped with its send and receive instants on the same clock.
//! 4. Only samples sent after the load started and answered before it
//!    finished count toward the loaded latency.
//!
//! The start signal marks the load task being scheduled, not the first byte
//! on the wire: the runner gives no readiness callback from iperf3. The
//! ramp-up delay covers process start and TCP slow start, so a link that
//! takes longer than `ramp_up_ms` to saturate will read low.
//!
//! A loaded pass in which every in-window ping is lost is graded, not
//! reported as unavailable: each lost reply is charged the per-sample
//! timeout.
//!
//! The load task is aborted if the probe is dropped, which in turn kills the
//! load generator process.

use super::iperf::{Direction, Iperf3};
use super::ping::PingProbe;
use crate::config::{BufferbloatConfig, GradeBands};
use crate::error::{ProbeError, StatsError};
use crate::models::BufferbloatResult;
use crate::stats::{self, LatencySample};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::debug;

/// A latency sample stamped on the probe's monotonic clock
#[derive(Debug, Clone, Copy)]
struct TimedSample {
    sent: Instant,
    received: Instant,
    sample: LatencySample,
}

/// Samples of the loaded pass that fell inside the load window
#[derive(Debug, Clone, Default, PartialEq)]
struct LoadWindow {
    replies: Vec<f64>,
    lost: usize,
    discarded: usize,
}

/// Keep samples sent at or after `start` and answered at or before `end`
fn within_load_window(samples: &[TimedSample], start: Instant, end: Instant) -> LoadWindow {
    let mut window = LoadWindow::default();
    for timed in samples {
        if timed.sent < start || timed.received > end {
            window.discarded += 1;
            continue;
        }
        match timed.sample.latency_ms() {
            Some(ms) => window.replies.push(ms),
            None => window.lost += 1,
        }
    }
    window
}

/// Raw measurements of one bufferbloat run
#[derive(Debug, Clone, PartialEq)]
pub struct BufferbloatSamples {
    /// Idle-pass replies
    pub idle: Vec<f64>,
    /// Replies inside the load window
    pub loaded: Vec<f64>,
    /// Pings inside the load window that got no reply
    pub loaded_lost: usize,
    /// Samples dropped for falling outside the load window
    pub discarded: usize,
    /// Latency charged for a lost loaded ping
    pub lost_latency_ms: f64,
}

impl BufferbloatSamples {
    /// Idle median vs the configured loaded percentile, graded
    pub fn evaluate(&self, config: &BufferbloatConfig) -> Result<BufferbloatResult, StatsError> {
        let idle = stats::median(&self.idle)?;
        let loaded = if self.loaded.is_empty() && self.loaded_lost > 0 {
            self.lost_latency_ms
        } else {
            stats::percentile(&self.loaded, config.loaded_percentile)?
        };

        let mut result = grade_latency(idle, loaded, &config.grades, self.loaded.len());
        result.loaded_loss_percent = stats::packet_loss(
            (self.loaded.len() + self.loaded_lost) as u64,
            self.loaded.len() as u64,
        );
        Ok(result)
    }
}

/// Build a graded result from idle and loaded latency
pub fn grade_latency(
    idle_ms: f64,
    loaded_ms: f64,
    bands: &GradeBands,
    loaded_samples: usize,
) -> BufferbloatResult {
    let delta = loaded_ms - idle_ms;
    let pct = if idle_ms > 0.0 { delta / idle_ms * 100.0 } else { 0.0 };

    BufferbloatResult {
        idle_latency_ms: idle_ms,
        loaded_latency_ms: loaded_ms.max(0.0),
        latency_increase_ms: delta,
        latency_increase_pct: pct,
        grade: bands.grade(delta),
        loaded_samples,
        loaded_loss_percent: 0.0,
    }
}

/// Aborts the wrapped task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Clone)]
pub struct BufferbloatProbe {
    ping: PingProbe,
    iperf: Iperf3,
    config: BufferbloatConfig,
}

impl BufferbloatProbe {
    pub fn new(ping: PingProbe, iperf: Iperf3, config: BufferbloatConfig) -> Self {
        Self { ping, iperf, config }
    }

    /// Run the idle pass and the loaded pass
    pub async fn measure(&self) -> Result<BufferbloatSamples, ProbeError> {
        let idle_pass = self
            .ping
            .clone()
            .with_count(self.config.idle_samples)
            .measure()
            .await?;
        let idle: Vec<f64> = idle_pass
            .samples
            .iter()
            .filter_map(LatencySample::latency_ms)
            .collect();
        if idle.is_empty() {
            return Err(ProbeError::Unavailable(format!(
                "no idle replies from {}",
                self.ping.target()
            )));
        }

        let (started_tx, started_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(None);
        let iperf = self.iperf.clone();
        let load_duration = self.config.load_duration();

        let mut load = AbortOnDrop(tokio::spawn(async move {
            let _ = started_tx.send(Instant::now());
            let outcome = iperf.tcp(Direction::Download, load_duration).await;
            let _ = finished_tx.send(Some(Instant::now()));
            outcome
        }));

        let window_start = started_rx.await.map_err(|_| {
            ProbeError::Unavailable("load generator exited before starting".to_string())
        })?;
        let timed = self.sample_under_load(window_start, finished_rx.clone()).await?;

        let load_run = (&mut load.0)
            .await
            .map_err(|e| ProbeError::Unavailable(format!("load generator task failed: {}", e)))??;
        let window_end = (*finished_rx.borrow()).unwrap_or_else(Instant::now);

        let window = within_load_window(&timed, window_start, window_end);

        debug!(
            idle_samples = idle.len(),
            loaded_samples = window.replies.len(),
            loaded_lost = window.lost,
            discarded = window.discarded,
            window_ms = window_end.duration_since(window_start).as_millis() as u64,
            load_mbps = load_run.mbps,
            "Bufferbloat passes finished"
        );

        if window.replies.is_empty() && window.lost == 0 {
            return Err(ProbeError::Unavailable(
                "no pings were sent inside the load window".to_string(),
            ));
        }

        Ok(BufferbloatSamples {
            idle,
            loaded: window.replies,
            loaded_lost: window.lost,
            discarded: window.discarded,
            lost_latency_ms: self.ping.sample_timeout().as_secs_f64() * 1000.0,
        })
    }

    /// Issue single pings from ramp-up until the load finishes
    async fn sample_under_load(
        &self,
        window_start: Instant,
        mut finished: watch::Receiver<Option<Instant>>,
    ) -> Result<Vec<TimedSample>, ProbeError> {
        let mut samples = Vec::new();

        tokio::select! {
            _ = sleep_until(window_start + self.config.ramp_up()) => {}
            _ = finished.changed() => {}
        }

        while finished.borrow().is_none() {
            let sent = Instant::now();
            let sample = tokio::select! {
                sample = self.ping.sample_once() => sample?,
                _ = finished.changed() => break,
            };
            samples.push(TimedSample {
                sent,
                received: Instant::now(),
                sample,
            });

            tokio::select! {
                _ = sleep(self.config.sample_interval()) => {}
                _ = finished.changed() => break,
            }
        }

        Ok(samples)
    }
}
