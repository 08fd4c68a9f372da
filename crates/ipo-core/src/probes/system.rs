//! Host facts used by the recommendation rules
//!
//! Reads:
//! - /proc/net/route for the interface carrying the default route
//! - /sys/class/net/<iface>/queues for its RX queue count
//!
//! Hosts without procfs/sysfs report no NIC; the RSS rule then has no
//! evidence and stays silent.

use crate::models::{NicInfo, SystemInfo};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Collects `SystemInfo` from procfs and sysfs
#[derive(Debug, Clone)]
pub struct SystemInspector {
    proc_path: PathBuf,
    sys_path: PathBuf,
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemInspector {
    pub fn new() -> Self {
        Self {
            proc_path: PathBuf::from("/proc"),
            sys_path: PathBuf::from("/sys"),
        }
    }

    /// Create inspector with custom proc and sys roots (for testing)
    pub fn with_paths(proc_path: impl Into<PathBuf>, sys_path: impl Into<PathBuf>) -> Self {
        Self {
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
        }
    }

    pub async fn inspect(&self) -> SystemInfo {
        let nic = self.primary_nic().await;
        SystemInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            logical_cores: num_cpus::get(),
            nic,
        }
    }

    async fn primary_nic(&self) -> Option<NicInfo> {
        let route_file = self.proc_path.join("net/route");
        let content = match fs::read_to_string(&route_file).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %route_file.display(), error = %e, "No routing table available");
                return None;
            }
        };

        let name = Self::parse_default_route(&content)?;
        let rx_queues = self.count_rx_queues(&name).await;

        Some(NicInfo {
            rss_enabled: rx_queues > 1,
            name,
            rx_queues,
        })
    }

    /// Interface of the lowest-metric default route in /proc/net/route
    pub fn parse_default_route(content: &str) -> Option<String> {
        content
            .lines()
            .skip(1)
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 7 || fields[1] != "00000000" {
                    return None;
                }
                // RTF_UP
                let flags = u32::from_str_radix(fields[3], 16).ok()?;
                if flags & 0x1 == 0 {
                    return None;
                }
                let metric: u32 = fields[6].parse().unwrap_or(u32::MAX);
                Some((metric, fields[0].to_string()))
            })
            .min_by_key(|(metric, _)| *metric)
            .map(|(_, iface)| iface)
    }

    /// Number of `rx-*` entries under the interface's queues directory,
    /// at least one
    async fn count_rx_queues(&self, iface: &str) -> u32 {
        let queues = self.sys_path.join("class/net").join(iface).join("queues");
        Self::count_prefixed(&queues, "rx-").await.max(1)
    }

    async fn count_prefixed(dir: &Path, prefix: &str) -> u32 {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut count = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(prefix) {
                count += 1;
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ROUTE_TABLE: &str = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
eth0\t00000000\t0100000A\t0003\t0\t0\t100\t00000000\t0\t0\t0
eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\t0\t0\t0
";

    fn fixture(route: &str, iface: &str, rx_queues: u32) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("proc/net")).unwrap();
        std::fs::write(dir.path().join("proc/net/route"), route).unwrap();

        let queues = dir.path().join("sys/class/net").join(iface).join("queues");
        std::fs::create_dir_all(&queues).unwrap();
        for i in 0..rx_queues {
            std::fs::create_dir(queues.join(format!("rx-{}", i))).unwrap();
            std::fs::create_dir(queues.join(format!("tx-{}", i))).unwrap();
        }
        dir
    }

    fn inspector(dir: &TempDir) -> SystemInspector {
        SystemInspector::with_paths(dir.path().join("proc"), dir.path().join("sys"))
    }

    #[test]
    fn test_parse_default_route_prefers_lowest_metric() {
        assert_eq!(
            SystemInspector::parse_default_route(ROUTE_TABLE),
            Some("eth0".to_string())
        );
    }

    #[test]
    fn test_parse_default_route_none() {
        let table = "Iface\tDestination\tGateway\tFlags\tRefCnt\tUse\tMetric\tMask\n\
                     eth0\t0000000A\t00000000\t0001\t0\t0\t100\t00FFFFFF\n";
        assert_eq!(SystemInspector::parse_default_route(table), None);
    }

    #[tokio::test]
    async fn test_single_queue_nic() {
        let dir = fixture(ROUTE_TABLE, "eth0", 1);
        let info = inspector(&dir).inspect().await;

        let nic = info.nic.unwrap();
        assert_eq!(nic.name, "eth0");
        assert_eq!(nic.rx_queues, 1);
        assert!(!nic.rss_enabled);
        assert!(info.logical_cores >= 1);
    }

    #[tokio::test]
    async fn test_multi_queue_nic() {
        let dir = fixture(ROUTE_TABLE, "eth0", 4);
        let nic = inspector(&dir).inspect().await.nic.unwrap();

        assert_eq!(nic.rx_queues, 4);
        assert!(nic.rss_enabled);
    }

    #[tokio::test]
    async fn test_missing_procfs() {
        let dir = TempDir::new().unwrap();
        let info = inspector(&dir).inspect().await;
        assert!(info.nic.is_none());
        assert_eq!(info.os, std::env::consts::OS);
    }
}
