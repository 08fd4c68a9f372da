//! Sample statistics over latency measurements
//!
//! Order statistics use linear interpolation between the two closest ranks,
//! so `percentile(s, p)` always lies within `[min(s), max(s)]` and is
//! monotonic in `p`.

use crate::error::StatsError;
use crate::models::IcmpResult;

/// Number of raw samples retained in an `IcmpResult`
pub const RAW_SAMPLE_LIMIT: usize = 100;

/// Why a single round trip produced no latency value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    Timeout,
    Unreachable,
    TtlExceeded,
}

/// One round-trip measurement: a latency in milliseconds or a loss marker
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LatencySample {
    Reply(f64),
    Lost(LossReason),
}

impl LatencySample {
    pub fn latency_ms(&self) -> Option<f64> {
        match self {
            LatencySample::Reply(ms) => Some(*ms),
            LatencySample::Lost(_) => None,
        }
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, LatencySample::Lost(_))
    }
}

/// Linearly interpolated percentile of `samples`, `p` in `[0, 100]`
pub fn percentile(samples: &[f64], p: f64) -> Result<f64, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    if !(0.0..=100.0).contains(&p) {
        return Err(StatsError::InvalidArgument(format!(
            "percentile must be within [0, 100], got {}",
            p
        )));
    }
    if samples.iter().any(|v| v.is_nan()) {
        return Err(StatsError::InvalidArgument("sample set contains NaN".to_string()));
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Ok(interpolate(&sorted, p))
}

/// Percentile over an already sorted, non-empty slice
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

pub fn median(samples: &[f64]) -> Result<f64, StatsError> {
    percentile(samples, 50.0)
}

pub fn mean(samples: &[f64]) -> Result<f64, StatsError> {
    if samples.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Sample standard deviation (Bessel's correction); zero for a single sample
pub fn std_dev(samples: &[f64]) -> Result<f64, StatsError> {
    let avg = mean(samples)?;
    if samples.len() < 2 {
        return Ok(0.0);
    }
    let variance = samples.iter().map(|v| (v - avg).powi(2)).sum::<f64>()
        / (samples.len() - 1) as f64;
    Ok(variance.sqrt())
}

/// Loss percentage from requested vs received counts, clamped to `[0, 100]`
/// so inconsistent counts (duplicate replies) never leave the valid range.
/// Nothing requested counts as total loss.
pub fn packet_loss(requested: u64, received: u64) -> f64 {
    if requested == 0 {
        return 100.0;
    }
    let lost = requested as f64 - received as f64;
    (lost / requested as f64 * 100.0).clamp(0.0, 100.0)
}

/// Summarise a probe's samples into an `IcmpResult`.
///
/// Percentiles are computed over replies only. `attempts` is the number of
/// round trips the probe issued; when it is smaller than the number of
/// samples seen, the sample count wins. With no replies at all the latency
/// fields are zero and loss is 100%.
pub fn summarize(samples: &[LatencySample], attempts: u64) -> Result<IcmpResult, StatsError> {
    let replies: Vec<f64> = samples.iter().filter_map(LatencySample::latency_ms).collect();
    let attempts = attempts.max(samples.len() as u64);

    if replies.is_empty() {
        return Ok(IcmpResult::all_lost(attempts));
    }

    let mut sorted = replies.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.iter().any(|v| v.is_nan()) {
        return Err(StatsError::InvalidArgument("sample set contains NaN".to_string()));
    }

    Ok(IcmpResult {
        samples: attempts,
        p50: interpolate(&sorted, 50.0),
        p90: interpolate(&sorted, 90.0),
        p95: interpolate(&sorted, 95.0),
        p99: interpolate(&sorted, 99.0),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        mean: mean(&replies)?,
        stddev: std_dev(&replies)?,
        packet_loss: packet_loss(attempts, replies.len() as u64),
        raw_samples: replies.into_iter().take(RAW_SAMPLE_LIMIT).collect(),
    })
}
