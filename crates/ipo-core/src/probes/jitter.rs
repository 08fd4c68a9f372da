//! UDP jitter probe

use super::iperf::Iperf3;
use crate::error::ProbeError;
use crate::models::JitterResult;

/// One iperf3 UDP run at a fixed bitrate
#[derive(Clone)]
pub struct JitterProbe {
    iperf: Iperf3,
}

impl JitterProbe {
    pub fn new(iperf: Iperf3) -> Self {
        Self { iperf }
    }

    pub async fn run(&self) -> Result<JitterResult, ProbeError> {
        let run = self.iperf.udp().await?;

        Ok(JitterResult {
            mean_jitter_ms: run.jitter_ms,
            packet_loss_percent: run.lost_percent,
            lost_packets: run.lost_packets,
            total_packets: run.packets,
            out_of_order: run.out_of_order,
        })
    }
}
