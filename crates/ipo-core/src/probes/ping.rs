//! ICMP latency probe
//!
//! Drives the platform `ping` utility and parses its per-reply lines:
//! - `64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms` (Linux/macOS)
//! - `Reply from 1.1.1.1: bytes=32 time=12ms TTL=57` (Windows)
//! - timeout, unreachable and TTL-exceeded lines become loss markers
//!
//! The trailing summary (`N packets transmitted, M received` or
//! `Sent = N, Received = M`) fixes the attempt count when present.

use crate::config::PingConfig;
use crate::error::{ProbeError, StatsError};
use crate::models::IcmpResult;
use crate::runner::{argv, CommandOutput, ProbeRunner};
use crate::stats::{self, LatencySample, LossReason};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Output grammar and flag set of the host `ping`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Parsed `ping` output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingTranscript {
    /// Replies and loss markers in output order
    pub samples: Vec<LatencySample>,
    /// Probes sent according to the summary line
    pub transmitted: Option<u64>,
    /// Replies according to the summary line
    pub received: Option<u64>,
}

impl PingTranscript {
    pub fn replies(&self) -> usize {
        self.samples.iter().filter(|s| !s.is_lost()).count()
    }

    pub fn failures(&self) -> usize {
        self.samples.iter().filter(|s| s.is_lost()).count()
    }

    /// Round trips attempted: the summary count, or every line seen
    pub fn attempts(&self) -> u64 {
        self.transmitted.unwrap_or(self.samples.len() as u64)
    }

    /// Latency distribution over replies; all-lost passes yield zeros with
    /// 100% loss
    pub fn summarize(&self) -> Result<IcmpResult, StatsError> {
        stats::summarize(&self.samples, self.attempts())
    }
}

/// Parse the stdout of one `ping` invocation
pub fn parse_output(stdout: &str) -> PingTranscript {
    let mut transcript = PingTranscript::default();

    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("DUP!") {
            continue;
        }

        if let Some(ms) = parse_reply_time(line) {
            transcript.samples.push(LatencySample::Reply(ms));
        } else if let Some(reason) = parse_loss(line) {
            transcript.samples.push(LatencySample::Lost(reason));
        } else if let Some((sent, received)) = parse_summary(line) {
            transcript.transmitted = Some(sent);
            transcript.received = Some(received);
        }
    }

    transcript
}

/// Latency from `time=12.3 ms`, `time=12ms` or `time<1ms`
fn parse_reply_time(line: &str) -> Option<f64> {
    let start = line.find("time=").or_else(|| line.find("time<"))? + 5;
    let number: String = line[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse::<f64>().ok().filter(|ms| ms.is_finite())
}

fn parse_loss(line: &str) -> Option<LossReason> {
    let lower = line.to_ascii_lowercase();
    if lower.contains("request timed out")
        || lower.contains("request timeout")
        || lower.contains("no answer yet")
    {
        Some(LossReason::Timeout)
    } else if lower.contains("unreachable") {
        Some(LossReason::Unreachable)
    } else if lower.contains("time to live exceeded") || lower.contains("ttl expired") {
        Some(LossReason::TtlExceeded)
    } else {
        None
    }
}

/// `(sent, received)` from either summary grammar
fn parse_summary(line: &str) -> Option<(u64, u64)> {
    if line.contains("packets transmitted") {
        // "10 packets transmitted, 9 received, 10% packet loss"
        // "10 packets transmitted, 9 packets received, 10.0% packet loss"
        let mut parts = line.split(',');
        let sent = leading_number(parts.next()?)?;
        let received = leading_number(parts.next()?)?;
        return Some((sent, received));
    }

    if line.contains("Sent =") && line.contains("Received =") {
        // "Packets: Sent = 4, Received = 3, Lost = 1 (25% loss),"
        let sent = number_after(line, "Sent =")?;
        let received = number_after(line, "Received =")?;
        return Some((sent, received));
    }

    None
}

fn leading_number(field: &str) -> Option<u64> {
    field.split_whitespace().next()?.parse().ok()
}

fn number_after(line: &str, label: &str) -> Option<u64> {
    let start = line.find(label)? + label.len();
    let digits: String = line[start..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Baseline latency probe
#[derive(Clone)]
pub struct PingProbe {
    target: String,
    config: PingConfig,
    platform: Platform,
    runner: Arc<dyn ProbeRunner>,
}

impl PingProbe {
    pub fn new(target: impl Into<String>, config: PingConfig, runner: Arc<dyn ProbeRunner>) -> Self {
        Self {
            target: target.into(),
            config,
            platform: Platform::current(),
            runner,
        }
    }

    /// Override the detected platform (for testing)
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Override the number of round trips per pass
    pub fn with_count(mut self, count: u32) -> Self {
        self.config.count = count;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// How long a single round trip may wait for its reply
    pub fn sample_timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Argument vector for a pass of `count` round trips
    pub fn command(&self, count: u32) -> Vec<String> {
        let count = count.to_string();
        let size = self.config.packet_size.to_string();
        match self.platform {
            Platform::Unix => {
                let timeout_secs = self.config.timeout_ms.div_ceil(1000).max(1).to_string();
                let interval_secs = (self.config.interval_ms as f64 / 1000.0).to_string();
                argv([
                    "ping",
                    "-c",
                    count.as_str(),
                    "-s",
                    size.as_str(),
                    "-W",
                    timeout_secs.as_str(),
                    "-i",
                    interval_secs.as_str(),
                    self.target.as_str(),
                ])
            }
            Platform::Windows => {
                let timeout_ms = self.config.timeout_ms.to_string();
                argv([
                    "ping",
                    "-n",
                    count.as_str(),
                    "-l",
                    size.as_str(),
                    "-w",
                    timeout_ms.as_str(),
                    self.target.as_str(),
                ])
            }
        }
    }

    /// Wall-clock bound for a pass of `count` round trips
    fn run_timeout(&self, count: u32) -> Duration {
        (self.config.interval() + self.config.timeout()) * count + Duration::from_secs(30)
    }

    /// Run one pass of `config.count` round trips
    pub async fn measure(&self) -> Result<PingTranscript, ProbeError> {
        self.measure_count(self.config.count).await
    }

    async fn measure_count(&self, count: u32) -> Result<PingTranscript, ProbeError> {
        let command = self.command(count);
        let output = self.runner.run(&command, self.run_timeout(count)).await?;
        let transcript = interpret(&output)?;

        debug!(
            target_host = %self.target,
            replies = transcript.replies(),
            failures = transcript.failures(),
            transmitted = ?transcript.transmitted,
            "Ping pass finished"
        );
        Ok(transcript)
    }

    /// Issue a single round trip. A missing reply is a loss marker, not an
    /// error.
    pub async fn sample_once(&self) -> Result<LatencySample, ProbeError> {
        let transcript = self.measure_count(1).await?;
        Ok(transcript
            .samples
            .into_iter()
            .find(|s| !s.is_lost())
            .unwrap_or(LatencySample::Lost(LossReason::Timeout)))
    }
}

/// Separate "the utility could not run" from "every probe was lost"
fn interpret(output: &CommandOutput) -> Result<PingTranscript, ProbeError> {
    let transcript = parse_output(&output.stdout);
    if !transcript.samples.is_empty() || transcript.transmitted.is_some() {
        return Ok(transcript);
    }

    let stderr = output.stderr.trim();
    if !output.success() {
        let reason = if stderr.is_empty() {
            format!("ping exited with status {}", output.exit_code)
        } else {
            stderr.lines().next().unwrap_or(stderr).to_string()
        };
        return Err(ProbeError::Unavailable(reason));
    }

    Err(ProbeError::Parse(format!(
        "no replies or summary in ping output ({} bytes)",
        output.stdout.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::mock::{ok, ScriptedRunner};

    const LINUX_OUTPUT: &str = "\
PING 1.1.1.1 (1.1.1.1) 32(60) bytes of data.
40 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=12.3 ms
40 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=11.8 ms
40 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=11.9 ms (DUP!)
From 192.168.1.1 icmp_seq=3 Destination Host Unreachable
40 bytes from 1.1.1.1: icmp_seq=4 ttl=57 time=14.1 ms

--- 1.1.1.1 ping statistics ---
5 packets transmitted, 3 received, +1 duplicates, +1 errors, 40% packet loss, time 803ms
rtt min/avg/max/mdev = 11.800/12.733/14.100/0.990 ms
";

    const WINDOWS_OUTPUT: &str = "\
Pinging 1.1.1.1 with 32 bytes of data:
Reply from 1.1.1.1: bytes=32 time=12ms TTL=57
Reply from 1.1.1.1: bytes=32 time<1ms TTL=57
Request timed out.
Reply from 1.1.1.1: bytes=32 time=15ms TTL=57

Ping statistics for 1.1.1.1:
    Packets: Sent = 4, Received = 3, Lost = 1 (25% loss),
";

    fn probe(runner: ScriptedRunner, platform: Platform) -> PingProbe {
        PingProbe::new("1.1.1.1", PingConfig::default(), Arc::new(runner)).with_platform(platform)
    }

    #[test]
    fn test_parse_linux_output() {
        let transcript = parse_output(LINUX_OUTPUT);

        assert_eq!(
            transcript.samples,
            vec![
                LatencySample::Reply(12.3),
                LatencySample::Reply(11.8),
                LatencySample::Lost(LossReason::Unreachable),
                LatencySample::Reply(14.1),
            ]
        );
        assert_eq!(transcript.transmitted, Some(5));
        assert_eq!(transcript.received, Some(3));
        assert_eq!(transcript.attempts(), 5);
    }

    #[test]
    fn test_parse_windows_output() {
        let transcript = parse_output(WINDOWS_OUTPUT);

        assert_eq!(transcript.replies(), 3);
        assert_eq!(transcript.failures(), 1);
        assert_eq!(transcript.samples[1], LatencySample::Reply(1.0));
        assert_eq!(transcript.samples[2], LatencySample::Lost(LossReason::Timeout));
        assert_eq!(transcript.transmitted, Some(4));
        assert_eq!(transcript.received, Some(3));
    }

    #[test]
    fn test_parse_macos_summary_and_ttl() {
        let output = "\
92 bytes from 10.0.0.1: Time to live exceeded
Request timeout for icmp_seq 1
64 bytes from 1.1.1.1: icmp_seq=2 ttl=57 time=9.871 ms
3 packets transmitted, 1 packets received, 66.7% packet loss
";
        let transcript = parse_output(output);

        assert_eq!(transcript.samples[0], LatencySample::Lost(LossReason::TtlExceeded));
        assert_eq!(transcript.samples[1], LatencySample::Reply(9.871));
        assert_eq!(transcript.transmitted, Some(3));
        assert_eq!(transcript.received, Some(1));
    }

    #[test]
    fn test_summary_defines_loss() {
        let icmp = parse_output(LINUX_OUTPUT).summarize().unwrap();

        assert_eq!(icmp.samples, 5);
        assert!((icmp.packet_loss - 40.0).abs() < 1e-9);
        assert_eq!(icmp.min, 11.8);
        assert_eq!(icmp.max, 14.1);
        assert!(icmp.p50 <= icmp.p90 && icmp.p90 <= icmp.p99 && icmp.p99 <= icmp.max);
    }

    #[test]
    fn test_unix_command() {
        let probe = probe(ScriptedRunner::new(), Platform::Unix);
        assert_eq!(
            probe.command(1000),
            vec!["ping", "-c", "1000", "-s", "32", "-W", "2", "-i", "0.2", "1.1.1.1"]
        );
    }

    #[test]
    fn test_windows_command() {
        let probe = probe(ScriptedRunner::new(), Platform::Windows);
        assert_eq!(
            probe.command(4),
            vec!["ping", "-n", "4", "-l", "32", "-w", "2000", "1.1.1.1"]
        );
    }

    #[tokio::test]
    async fn test_measure_uses_runner() {
        let runner = ScriptedRunner::new().on(|argv| {
            if argv[0] == "ping" {
                ok(LINUX_OUTPUT)
            } else {
                None
            }
        });
        let probe = probe(runner, Platform::Unix);

        let transcript = probe.measure().await.unwrap();
        assert_eq!(transcript.replies(), 3);
    }

    #[tokio::test]
    async fn test_all_lost_is_not_an_error() {
        let runner = ScriptedRunner::new().on(|_| {
            Some(Ok(CommandOutput {
                exit_code: 1,
                stdout: "--- 10.255.255.1 ping statistics ---\n\
                         20 packets transmitted, 0 received, 100% packet loss, time 19000ms\n"
                    .to_string(),
                stderr: String::new(),
            }))
        });
        let probe = probe(runner, Platform::Unix);

        let icmp = probe.measure().await.unwrap().summarize().unwrap();
        assert_eq!(icmp.packet_loss, 100.0);
        assert_eq!(icmp.samples, 20);
        assert_eq!(icmp.p50, 0.0);
        assert_eq!(icmp.p99, 0.0);
    }

    #[tokio::test]
    async fn test_permission_denied_is_unavailable() {
        let runner = ScriptedRunner::new().on(|_| {
            Some(Ok(CommandOutput {
                exit_code: 2,
                stdout: String::new(),
                stderr: "ping: socket: Operation not permitted\n".to_string(),
            }))
        });
        let probe = probe(runner, Platform::Unix);

        let err = probe.measure().await.unwrap_err();
        assert_eq!(
            err,
            ProbeError::Unavailable("ping: socket: Operation not permitted".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let probe = probe(ScriptedRunner::new(), Platform::Unix);
        let err = probe.measure().await.unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_garbage_output_is_parse_error() {
        let runner = ScriptedRunner::new().on(|_| ok("something unexpected\n"));
        let probe = probe(runner, Platform::Unix);

        let err = probe.measure().await.unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[tokio::test]
    async fn test_sample_once() {
        let runner = ScriptedRunner::new().on(|argv| {
            if argv.iter().any(|a| a == "-c") && argv[2] == "1" {
                ok("64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=20.5 ms\n\
                    1 packets transmitted, 1 received, 0% packet loss\n")
            } else {
                None
            }
        });
        let probe = probe(runner, Platform::Unix);

        assert_eq!(probe.sample_once().await.unwrap(), LatencySample::Reply(20.5));
    }

    #[tokio::test]
    async fn test_sample_once_lost() {
        let runner = ScriptedRunner::new().on(|_| {
            Some(Ok(CommandOutput {
                exit_code: 1,
                stdout: "1 packets transmitted, 0 received, 100% packet loss\n".to_string(),
                stderr: String::new(),
            }))
        });
        let probe = probe(runner, Platform::Unix);

        assert!(probe.sample_once().await.unwrap().is_lost());
    }
}
