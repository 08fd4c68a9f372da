//! TCP throughput probe

use super::iperf::{Direction, Iperf3};
use crate::error::ProbeError;
use crate::models::ThroughputResult;
use std::time::Duration;

/// Measures download then upload throughput against the iperf3 server.
/// An iperf3 server accepts one test at a time, so the directions never
/// overlap.
#[derive(Clone)]
pub struct ThroughputProbe {
    iperf: Iperf3,
    duration: Duration,
}

impl ThroughputProbe {
    pub fn new(iperf: Iperf3, duration: Duration) -> Self {
        Self { iperf, duration }
    }

    pub async fn run(&self) -> Result<ThroughputResult, ProbeError> {
        let download = self.iperf.tcp(Direction::Download, self.duration).await?;
        let upload = self.iperf.tcp(Direction::Upload, self.duration).await?;

        Ok(ThroughputResult {
            download_mbps: download.mbps,
            upload_mbps: upload.mbps,
            retransmits: download.retransmits + upload.retransmits,
            server: Some(self.iperf.server().to_string()),
        })
    }
}
