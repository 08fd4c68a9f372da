//! iperf3 client shared by the throughput, jitter and bufferbloat probes
//!
//! Runs are always requested with `-J` and decoded from the JSON report:
//! - TCP: `end.sum_received.bits_per_second`, `end.sum_sent.retransmits`
//! - UDP: `end.sum.{jitter_ms, lost_percent, lost_packets, packets}`
//!
//! A report carrying a top-level `error` (server busy, connection refused)
//! means the tool could not run the test.

use crate::config::IperfConfig;
use crate::error::ProbeError;
use crate::runner::{argv, CommandOutput, ProbeRunner};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Direction of a TCP run as seen from this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Server sends (`-R`)
    Download,
    Upload,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    end: Option<End>,
}

#[derive(Debug, Deserialize)]
struct End {
    #[serde(default)]
    sum_sent: Option<StreamSum>,
    #[serde(default)]
    sum_received: Option<StreamSum>,
    #[serde(default)]
    sum: Option<UdpSum>,
}

#[derive(Debug, Deserialize)]
struct StreamSum {
    bits_per_second: f64,
    #[serde(default)]
    retransmits: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UdpSum {
    #[serde(default)]
    jitter_ms: f64,
    #[serde(default)]
    lost_percent: f64,
    #[serde(default)]
    lost_packets: u64,
    #[serde(default)]
    packets: u64,
    #[serde(default)]
    out_of_order: u64,
}

/// Outcome of one TCP run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TcpRun {
    pub mbps: f64,
    pub retransmits: u64,
}

/// Outcome of one UDP run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UdpRun {
    pub jitter_ms: f64,
    pub lost_percent: f64,
    pub lost_packets: u64,
    pub packets: u64,
    pub out_of_order: u64,
}

/// iperf3 invocation against the configured server
#[derive(Clone)]
pub struct Iperf3 {
    config: IperfConfig,
    runner: Arc<dyn ProbeRunner>,
}

impl Iperf3 {
    pub fn new(config: IperfConfig, runner: Arc<dyn ProbeRunner>) -> Self {
        Self { config, runner }
    }

    pub fn server(&self) -> &str {
        &self.config.server
    }

    fn base_command(&self, duration: Duration) -> Vec<String> {
        argv([
            "iperf3".to_string(),
            "-c".to_string(),
            self.config.server.clone(),
            "-p".to_string(),
            self.config.port.to_string(),
            "-J".to_string(),
            "-t".to_string(),
            duration.as_secs().max(1).to_string(),
        ])
    }

    pub fn tcp_command(&self, direction: Direction, duration: Duration) -> Vec<String> {
        let mut command = self.base_command(duration);
        command.push("-P".to_string());
        command.push(self.config.parallel.max(1).to_string());
        if direction == Direction::Download {
            command.push("-R".to_string());
        }
        command
    }

    pub fn udp_command(&self) -> Vec<String> {
        let mut command = self.base_command(self.config.duration());
        command.push("-u".to_string());
        command.push("-b".to_string());
        command.push(self.config.udp_bandwidth.clone());
        command
    }

    /// Wall-clock bound for a run of `duration`
    fn run_timeout(&self, duration: Duration) -> Duration {
        duration * 2 + Duration::from_secs(15)
    }

    /// Run one TCP test of `duration` in `direction`
    pub async fn tcp(&self, direction: Direction, duration: Duration) -> Result<TcpRun, ProbeError> {
        let command = self.tcp_command(direction, duration);
        let output = self.runner.run(&command, self.run_timeout(duration)).await?;
        let run = parse_tcp(&output)?;

        debug!(
            server = %self.config.server,
            direction = direction.as_str(),
            mbps = run.mbps,
            retransmits = run.retransmits,
            "iperf3 TCP run finished"
        );
        Ok(run)
    }

    /// Run one UDP test at the configured bitrate
    pub async fn udp(&self) -> Result<UdpRun, ProbeError> {
        let command = self.udp_command();
        let output = self
            .runner
            .run(&command, self.config.run_timeout())
            .await?;
        let run = parse_udp(&output)?;

        debug!(
            server = %self.config.server,
            jitter_ms = run.jitter_ms,
            lost_percent = run.lost_percent,
            "iperf3 UDP run finished"
        );
        Ok(run)
    }
}

fn decode(output: &CommandOutput) -> Result<End, ProbeError> {
    if output.stdout.trim().is_empty() {
        let stderr = output.stderr.trim();
        return Err(if output.success() {
            ProbeError::Parse("iperf3 produced no output".to_string())
        } else if stderr.is_empty() {
            ProbeError::Unavailable(format!("iperf3 exited with status {}", output.exit_code))
        } else {
            ProbeError::Unavailable(stderr.to_string())
        });
    }

    let report: Report = serde_json::from_str(&output.stdout)
        .map_err(|e| ProbeError::Parse(format!("invalid iperf3 JSON: {}", e)))?;

    if let Some(error) = report.error {
        return Err(ProbeError::Unavailable(format!("iperf3: {}", error)));
    }

    report
        .end
        .ok_or_else(|| ProbeError::Parse("iperf3 report has no end section".to_string()))
}

fn parse_tcp(output: &CommandOutput) -> Result<TcpRun, ProbeError> {
    let end = decode(output)?;
    let received = end
        .sum_received
        .ok_or_else(|| ProbeError::Parse("iperf3 report has no sum_received".to_string()))?;

    if !received.bits_per_second.is_finite() || received.bits_per_second < 0.0 {
        return Err(ProbeError::Parse(format!(
            "invalid bitrate {}",
            received.bits_per_second
        )));
    }

    Ok(TcpRun {
        mbps: received.bits_per_second / 1_000_000.0,
        retransmits: end.sum_sent.and_then(|s| s.retransmits).unwrap_or(0),
    })
}

fn parse_udp(output: &CommandOutput) -> Result<UdpRun, ProbeError> {
    let end = decode(output)?;
    let sum = end
        .sum
        .ok_or_else(|| ProbeError::Parse("iperf3 UDP report has no sum".to_string()))?;

    if !sum.jitter_ms.is_finite() || sum.jitter_ms < 0.0 {
        return Err(ProbeError::Parse(format!("invalid jitter {}", sum.jitter_ms)));
    }

    Ok(UdpRun {
        jitter_ms: sum.jitter_ms,
        lost_percent: if sum.lost_percent.is_finite() {
            sum.lost_percent.clamp(0.0, 100.0)
        } else {
            0.0
        },
        lost_packets: sum.lost_packets,
        packets: sum.packets,
        out_of_order: sum.out_of_order,
    })
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn output(stdout: String) -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            stdout,
            stderr: String::new(),
        }
    }

    fn client() -> Iperf3 {
        Iperf3::new(
            IperfConfig::default(),
            Arc::new(crate::runner::mock::ScriptedRunner::new()),
        )
    }

    #[test]
    fn test_tcp_commands() {
        let iperf = client();
        assert_eq!(
            iperf.tcp_command(Direction::Download, Duration::from_secs(10)),
            vec!["iperf3", "-c", "iperf.he.net", "-p", "5201", "-J", "-t", "10", "-P", "1", "-R"]
        );
        assert_eq!(
            iperf.tcp_command(Direction::Upload, Duration::from_secs(5)),
            vec!["iperf3", "-c", "iperf.he.net", "-p", "5201", "-J", "-t", "5", "-P", "1"]
        );
    }

    #[test]
    fn test_udp_command() {
        let command = client().udp_command();
        assert_eq!(&command[command.len() - 3..], &["-u", "-b", "10M"]);
    }

    #[test]
    fn test_parse_tcp() {
        let run = parse_tcp(&output(tcp_report(94_300_000.0, 12))).unwrap();
        assert!((run.mbps - 94.3).abs() < 1e-9);
        assert_eq!(run.retransmits, 12);
    }

    #[test]
    fn test_parse_udp() {
        let run = parse_udp(&output(udp_report(2.5, 0.5))).unwrap();
        assert_eq!(run.jitter_ms, 2.5);
        assert_eq!(run.lost_percent, 0.5);
        assert_eq!(run.lost_packets, 4);
        assert_eq!(run.packets, 800);
        assert_eq!(run.out_of_order, 1);
    }

    #[test]
    fn test_udp_loss_is_clamped() {
        let run = parse_udp(&output(udp_report(1.0, 140.0))).unwrap();
        assert_eq!(run.lost_percent, 100.0);
    }

    #[test]
    fn test_error_report_is_unavailable() {
        let err = parse_tcp(&CommandOutput {
            exit_code: 1,
            stdout: error_report("the server is busy running a test. try again later"),
            stderr: String::new(),
        })
        .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(msg) if msg.contains("server is busy")));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_tcp(&output("Connecting to host iperf.he.net".to_string())).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = parse_udp(&output(tcp_report(1.0, 0))).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn test_empty_output_with_failure_is_unavailable() {
        let err = parse_tcp(&CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "iperf3: error - unable to connect to server".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable(_)));
    }
}
