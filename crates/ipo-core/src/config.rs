//! Benchmark configuration
//!
//! A `BenchConfig` is built once (defaults, then an optional file, then
//! `IPO__*` environment variables) and treated as immutable afterwards. The
//! orchestrator holds it behind an `Arc`; nothing in the crate keeps
//! configuration in module-level state.

use crate::error::BenchmarkError;
use crate::models::BufferbloatGrade;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Top-level benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Host used for ICMP and bufferbloat latency sampling
    pub target: String,
    pub ping: PingConfig,
    pub iperf: IperfConfig,
    pub dns: DnsConfig,
    pub bufferbloat: BufferbloatConfig,
    pub probes: ProbeSelection,
    pub thresholds: RuleThresholds,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            ping: PingConfig::default(),
            iperf: IperfConfig::default(),
            dns: DnsConfig::default(),
            bufferbloat: BufferbloatConfig::default(),
            probes: ProbeSelection::default(),
            thresholds: RuleThresholds::default(),
        }
    }
}

fn default_target() -> String {
    "1.1.1.1".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    /// Round trips per baseline pass
    pub count: u32,
    /// Per-sample reply timeout
    pub timeout_ms: u64,
    /// Delay between round trips
    pub interval_ms: u64,
    /// ICMP payload size in bytes
    pub packet_size: u32,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 1000,
            timeout_ms: 2000,
            interval_ms: 200,
            packet_size: 32,
        }
    }
}

impl PingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IperfConfig {
    pub server: String,
    pub port: u16,
    /// Length of each throughput/jitter run
    pub duration_secs: u64,
    /// Parallel TCP streams
    pub parallel: u32,
    /// Target bitrate of the UDP jitter run, iperf3 notation
    pub udp_bandwidth: String,
}

impl Default for IperfConfig {
    fn default() -> Self {
        Self {
            server: "iperf.he.net".to_string(),
            port: 5201,
            duration_secs: 10,
            parallel: 1,
            udp_bandwidth: "10M".to_string(),
        }
    }
}

impl IperfConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Wall-clock bound for one iperf3 run: twice the test length plus
    /// connection setup slack
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.duration_secs * 2 + 15)
    }
}

/// A resolver benchmarked by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedResolver {
    pub name: String,
    pub ip: IpAddr,
}

impl NamedResolver {
    pub fn new(name: &str, ip: IpAddr) -> Self {
        Self {
            name: name.to_string(),
            ip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Hostname resolved against every resolver
    pub hostname: String,
    /// Resolutions per resolver
    pub repeats: u32,
    pub timeout_ms: u64,
    pub resolvers: Vec<NamedResolver>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            hostname: "example.com".to_string(),
            repeats: 5,
            timeout_ms: 2000,
            resolvers: default_resolvers(),
        }
    }
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_resolvers() -> Vec<NamedResolver> {
    vec![
        NamedResolver::new("cloudflare", IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))),
        NamedResolver::new("google", IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))),
        NamedResolver::new("quad9", IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9))),
        NamedResolver::new("opendns", IpAddr::V4(Ipv4Addr::new(208, 67, 222, 222))),
    ]
}

/// Lower bounds (ms) of each bufferbloat grade band. A delta below
/// `a_plus_below` is A+, a delta of at least `f_from` is F.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradeBands {
    pub a_from: f64,
    pub b_from: f64,
    pub c_from: f64,
    pub d_from: f64,
    pub f_from: f64,
}

impl Default for GradeBands {
    fn default() -> Self {
        Self {
            a_from: 10.0,
            b_from: 30.0,
            c_from: 100.0,
            d_from: 200.0,
            f_from: 400.0,
        }
    }
}

impl GradeBands {
    /// Grade a loaded-minus-idle latency delta. Each band includes its lower
    /// bound; negative deltas grade A+.
    pub fn grade(&self, delta_ms: f64) -> BufferbloatGrade {
        if delta_ms.is_nan() {
            BufferbloatGrade::Unknown
        } else if delta_ms < self.a_from {
            BufferbloatGrade::APlus
        } else if delta_ms < self.b_from {
            BufferbloatGrade::A
        } else if delta_ms < self.c_from {
            BufferbloatGrade::B
        } else if delta_ms < self.d_from {
            BufferbloatGrade::C
        } else if delta_ms < self.f_from {
            BufferbloatGrade::D
        } else {
            BufferbloatGrade::F
        }
    }

    fn is_ascending(&self) -> bool {
        let bounds = [self.a_from, self.b_from, self.c_from, self.d_from, self.f_from];
        bounds.windows(2).all(|w| w[0] < w[1])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferbloatConfig {
    /// Round trips in the idle pass
    pub idle_samples: u32,
    /// Percentile of the loaded pass reported as loaded latency
    pub loaded_percentile: f64,
    /// Delay after the load generator starts before sampling begins
    pub ramp_up_ms: u64,
    /// Delay between loaded round trips
    pub sample_interval_ms: u64,
    /// Length of the download load run
    pub load_duration_secs: u64,
    pub grades: GradeBands,
}

impl Default for BufferbloatConfig {
    fn default() -> Self {
        Self {
            idle_samples: 20,
            loaded_percentile: 50.0,
            ramp_up_ms: 1000,
            sample_interval_ms: 200,
            load_duration_secs: 10,
            grades: GradeBands::default(),
        }
    }
}

impl BufferbloatConfig {
    pub fn ramp_up(&self) -> Duration {
        Duration::from_millis(self.ramp_up_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn load_duration(&self) -> Duration {
        Duration::from_secs(self.load_duration_secs)
    }
}

/// Optional probes; the baseline ping probe always runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSelection {
    pub throughput: bool,
    pub jitter: bool,
    pub dns: bool,
    pub bufferbloat: bool,
}

impl Default for ProbeSelection {
    fn default() -> Self {
        Self {
            throughput: true,
            jitter: true,
            dns: true,
            bufferbloat: true,
        }
    }
}

/// Thresholds of the recommendation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Bufferbloat delta above which SQM is recommended
    pub sqm_delta_ms: f64,
    /// Delta above which the SQM recommendation is high confidence
    pub sqm_high_confidence_delta_ms: f64,
    pub packet_loss_percent: f64,
    pub packet_loss_high_confidence_percent: f64,
    /// Minimum median gain over the system resolver to suggest switching
    pub dns_improvement_ms: f64,
    pub jitter_ms: f64,
    pub rss_min_cores: usize,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            sqm_delta_ms: 100.0,
            sqm_high_confidence_delta_ms: 200.0,
            packet_loss_percent: 1.0,
            packet_loss_high_confidence_percent: 5.0,
            dns_improvement_ms: 10.0,
            jitter_ms: 10.0,
            rss_min_cores: 2,
        }
    }
}

impl BenchConfig {
    /// Load configuration from an optional file and `IPO__*` environment
    /// variables (`IPO__PING__COUNT=200`, `IPO__IPERF__SERVER=...`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("IPO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: BenchConfig = settings
            .try_deserialize()
            .context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run meaningless
    pub fn validate(&self) -> std::result::Result<(), BenchmarkError> {
        let invalid = |msg: &str| Err(BenchmarkError::InvalidConfig(msg.to_string()));

        if self.target.trim().is_empty() {
            return invalid("target must not be empty");
        }
        if self.ping.count == 0 {
            return invalid("ping.count must be at least 1");
        }
        if self.bufferbloat.idle_samples == 0 {
            return invalid("bufferbloat.idle_samples must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.bufferbloat.loaded_percentile) {
            return invalid("bufferbloat.loaded_percentile must be within [0, 100]");
        }
        if !self.bufferbloat.grades.is_ascending() {
            return invalid("bufferbloat.grades bounds must be strictly ascending");
        }
        if self.probes.dns && self.dns.resolvers.is_empty() {
            return invalid("dns.resolvers must not be empty when the DNS probe is enabled");
        }
        if self.probes.dns && self.dns.repeats == 0 {
            return invalid("dns.repeats must be at least 1");
        }
        if (self.probes.throughput || self.probes.jitter || self.probes.bufferbloat)
            && self.iperf.server.trim().is_empty()
        {
            return invalid("iperf.server must not be empty when load probes are enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BenchConfig::default();
        assert_eq!(config.target, "1.1.1.1");
        assert_eq!(config.ping.count, 1000);
        assert_eq!(config.bufferbloat.idle_samples, 20);
        assert_eq!(config.dns.resolvers.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grade_bands() {
        let bands = GradeBands::default();
        assert_eq!(bands.grade(-3.0), BufferbloatGrade::APlus);
        assert_eq!(bands.grade(5.0), BufferbloatGrade::APlus);
        assert_eq!(bands.grade(9.99), BufferbloatGrade::APlus);
        assert_eq!(bands.grade(10.0), BufferbloatGrade::A);
        assert_eq!(bands.grade(12.8), BufferbloatGrade::A);
        assert_eq!(bands.grade(30.0), BufferbloatGrade::B);
        assert_eq!(bands.grade(50.0), BufferbloatGrade::B);
        assert_eq!(bands.grade(100.0), BufferbloatGrade::C);
        assert_eq!(bands.grade(156.5), BufferbloatGrade::C);
        assert_eq!(bands.grade(200.0), BufferbloatGrade::D);
        assert_eq!(bands.grade(399.9), BufferbloatGrade::D);
        assert_eq!(bands.grade(400.0), BufferbloatGrade::F);
        assert_eq!(bands.grade(f64::NAN), BufferbloatGrade::Unknown);
    }

    #[test]
    fn test_grade_monotonic() {
        let bands = GradeBands::default();
        let mut previous = bands.grade(0.0);
        let mut delta = 0.0;
        while delta < 1000.0 {
            let grade = bands.grade(delta);
            assert!(grade >= previous, "grade regressed at {}ms", delta);
            previous = grade;
            delta += 0.5;
        }
    }

    #[test]
    fn test_validate_rejects_zero_count() {
        let mut config = BenchConfig::default();
        config.ping.count = 0;
        assert!(matches!(
            config.validate(),
            Err(BenchmarkError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unordered_bands() {
        let mut config = BenchConfig::default();
        config.bufferbloat.grades.c_from = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_allows_empty_resolvers_when_dns_disabled() {
        let mut config = BenchConfig::default();
        config.dns.resolvers.clear();
        assert!(config.validate().is_err());
        config.probes.dns = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ipo.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
target = "8.8.8.8"

[ping]
count = 50

[probes]
throughput = false

[thresholds]
jitter_ms = 20.0
"#
        )
        .unwrap();

        let config = BenchConfig::load(Some(&path)).unwrap();
        assert_eq!(config.target, "8.8.8.8");
        assert_eq!(config.ping.count, 50);
        assert_eq!(config.ping.timeout_ms, 2000);
        assert!(!config.probes.throughput);
        assert!(config.probes.dns);
        assert_eq!(config.thresholds.jitter_ms, 20.0);
        assert_eq!(config.thresholds.sqm_delta_ms, 100.0);
    }
}
