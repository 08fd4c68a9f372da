//! Core data models for benchmark results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Version of the `BenchmarkResult` JSON layout. Artifacts with a version
/// less than or equal to this one remain loadable.
pub const SCHEMA_VERSION: u32 = 1;

/// ICMP latency distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcmpResult {
    /// Round trips attempted
    pub samples: u64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    /// Loss percentage, 0-100
    pub packet_loss: f64,
    /// First replies in arrival order
    #[serde(default)]
    pub raw_samples: Vec<f64>,
}

impl IcmpResult {
    /// Result for a pass where every round trip was lost
    pub fn all_lost(attempts: u64) -> Self {
        Self {
            samples: attempts,
            p50: 0.0,
            p90: 0.0,
            p95: 0.0,
            p99: 0.0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            stddev: 0.0,
            packet_loss: 100.0,
            raw_samples: Vec::new(),
        }
    }
}

/// TCP throughput in both directions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub retransmits: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// UDP jitter and datagram loss
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JitterResult {
    pub mean_jitter_ms: f64,
    pub packet_loss_percent: f64,
    #[serde(default)]
    pub lost_packets: u64,
    #[serde(default)]
    pub total_packets: u64,
    #[serde(default)]
    pub out_of_order: u64,
}

/// Resolution timings for one DNS resolver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsResolverResult {
    pub resolver_name: String,
    pub resolver_ip: IpAddr,
    /// Median resolution time; `None` when every attempt failed
    pub median_ms: Option<f64>,
    #[serde(default)]
    pub p95_ms: Option<f64>,
    /// Percentage of attempts that resolved
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub attempts: u32,
    pub reachable: bool,
    /// The resolver the host is currently configured to use
    #[serde(default)]
    pub is_system: bool,
}

/// Bufferbloat grade, a step function of the loaded-minus-idle latency delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BufferbloatGrade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
    /// The load test could not run; no grade is claimed
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for BufferbloatGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BufferbloatGrade::APlus => "A+",
            BufferbloatGrade::A => "A",
            BufferbloatGrade::B => "B",
            BufferbloatGrade::C => "C",
            BufferbloatGrade::D => "D",
            BufferbloatGrade::F => "F",
            BufferbloatGrade::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Idle vs loaded latency comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferbloatResult {
    pub idle_latency_ms: f64,
    pub loaded_latency_ms: f64,
    #[serde(default)]
    pub latency_increase_ms: f64,
    #[serde(default)]
    pub latency_increase_pct: f64,
    pub grade: BufferbloatGrade,
    /// Latency samples that fell inside the load window
    #[serde(default)]
    pub loaded_samples: usize,
    /// Share of in-window pings that got no reply
    #[serde(default)]
    pub loaded_loss_percent: f64,
}

impl BufferbloatResult {
    /// Placeholder used when the load test could not run
    pub fn unknown() -> Self {
        Self {
            idle_latency_ms: 0.0,
            loaded_latency_ms: 0.0,
            latency_increase_ms: 0.0,
            latency_increase_pct: 0.0,
            grade: BufferbloatGrade::Unknown,
            loaded_samples: 0,
            loaded_loss_percent: 0.0,
        }
    }

    pub fn delta_ms(&self) -> f64 {
        self.loaded_latency_ms - self.idle_latency_ms
    }
}

/// Network interface carrying the default route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NicInfo {
    pub name: String,
    pub rx_queues: u32,
    /// Receive-side scaling is considered enabled with more than one RX queue
    pub rss_enabled: bool,
}

/// Host facts the recommendation rules depend on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub arch: String,
    pub logical_cores: usize,
    #[serde(default)]
    pub nic: Option<NicInfo>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            logical_cores: 1,
            nic: None,
        }
    }
}

/// Measurement probes scheduled by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    Ping,
    Throughput,
    Jitter,
    Dns,
    Bufferbloat,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Throughput => "throughput",
            ProbeKind::Jitter => "jitter",
            ProbeKind::Dns => "dns",
            ProbeKind::Bufferbloat => "bufferbloat",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Succeeded,
    Skipped,
    Failed,
}

/// Outcome of one probe within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub probe: ProbeKind,
    pub status: ProbeStatus,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Lifecycle of a benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Partial,
    Complete,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Partial => "partial",
            RunState::Complete => "complete",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete, immutable record of one benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub schema_version: u32,
    pub timestamp: DateTime<Utc>,
    pub target: String,
    /// `partial` or `complete`; failed runs produce no result
    pub state: RunState,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub system_info: SystemInfo,
    pub icmp: IcmpResult,
    pub throughput: ThroughputResult,
    pub jitter: JitterResult,
    pub bufferbloat: BufferbloatResult,
    #[serde(default)]
    pub dns: Vec<DnsResolverResult>,
    #[serde(default)]
    pub probes: Vec<ProbeReport>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl BenchmarkResult {
    pub fn probe_report(&self, kind: ProbeKind) -> Option<&ProbeReport> {
        self.probes.iter().find(|r| r.probe == kind)
    }

    /// Whether the probe produced real data. Artifacts written before probe
    /// reports existed carry none; their data is taken at face value.
    pub fn probe_succeeded(&self, kind: ProbeKind) -> bool {
        match self.probe_report(kind) {
            Some(report) => report.status == ProbeStatus::Succeeded,
            None => self.probes.is_empty(),
        }
    }

    /// The host's configured resolver, if it answered
    pub fn system_resolver(&self) -> Option<&DnsResolverResult> {
        self.dns.iter().find(|d| d.is_system && d.reachable)
    }

    /// Fastest reachable resolver (results are kept sorted by median)
    pub fn fastest_resolver(&self) -> Option<&DnsResolverResult> {
        self.dns.iter().find(|d| d.reachable && d.median_ms.is_some())
    }
}
