//! Built-in recommendation rules
//!
//! Every rule checks that the probe it reads produced real data before
//! looking at the numbers. A skipped or failed probe is not evidence of a
//! problem.

use super::{Category, Confidence, Recommendation, RiskLevel};
use crate::config::RuleThresholds;
use crate::models::{BenchmarkResult, BufferbloatGrade, ProbeKind};

/// Operating system of the measured host, selecting command syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    Linux,
    Windows,
    MacOs,
}

impl HostOs {
    /// Map a `std::env::consts::OS` value; unknown systems get Linux syntax
    pub fn from_name(os: &str) -> Self {
        match os {
            "windows" => HostOs::Windows,
            "macos" => HostOs::MacOs,
            _ => HostOs::Linux,
        }
    }
}

/// Inputs shared by every rule
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub thresholds: RuleThresholds,
    pub os: HostOs,
}

/// A declarative rule: a predicate over the result and a builder for the
/// recommendation it emits
#[derive(Clone, Copy)]
pub struct Rule {
    pub id: &'static str,
    /// Higher sorts first
    pub severity: u8,
    pub applies: fn(&BenchmarkResult, &RuleContext) -> bool,
    pub build: fn(&BenchmarkResult, &RuleContext) -> Recommendation,
}

/// The built-in rule table, in declaration order
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "sqm_openwrt",
            severity: 5,
            applies: bufferbloat_applies,
            build: bufferbloat_build,
        },
        Rule {
            id: "investigate_packet_loss",
            severity: 4,
            applies: packet_loss_applies,
            build: packet_loss_build,
        },
        Rule {
            id: "dns_switch_resolver",
            severity: 2,
            applies: dns_applies,
            build: dns_build,
        },
        Rule {
            id: "reduce_jitter",
            severity: 3,
            applies: jitter_applies,
            build: jitter_build,
        },
        Rule {
            id: "nic_rss_enable",
            severity: 1,
            applies: rss_applies,
            build: rss_build,
        },
    ]
}

fn strings(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

fn interface_name(result: &BenchmarkResult, fallback: &str) -> String {
    result
        .system_info
        .nic
        .as_ref()
        .map(|nic| nic.name.clone())
        .unwrap_or_else(|| fallback.to_string())
}

// Bufferbloat

fn bufferbloat_applies(result: &BenchmarkResult, ctx: &RuleContext) -> bool {
    result.probe_succeeded(ProbeKind::Bufferbloat)
        && result.bufferbloat.grade != BufferbloatGrade::Unknown
        && result.bufferbloat.delta_ms() > ctx.thresholds.sqm_delta_ms
}

fn bufferbloat_build(result: &BenchmarkResult, ctx: &RuleContext) -> Recommendation {
    let bb = &result.bufferbloat;
    let delta = bb.delta_ms();
    let confidence = if delta > ctx.thresholds.sqm_high_confidence_delta_ms {
        Confidence::High
    } else {
        Confidence::Medium
    };

    // Shape slightly below the measured line rate so the router's queue,
    // not the modem's, is the bottleneck
    let (download, upload) = if result.probe_succeeded(ProbeKind::Throughput)
        && result.throughput.download_mbps > 0.0
        && result.throughput.upload_mbps > 0.0
    {
        (
            format!("{:.0}", result.throughput.download_mbps * 950.0),
            format!("{:.0}", result.throughput.upload_mbps * 950.0),
        )
    } else {
        ("DOWNLOAD_KBIT".to_string(), "UPLOAD_KBIT".to_string())
    };

    Recommendation {
        id: "sqm_openwrt".to_string(),
        title: "Enable Smart Queue Management (SQM) on the router".to_string(),
        description: format!(
            "Latency rises by {:.0} ms under load (grade {}). Oversized buffers are \
             queuing traffic; SQM with CAKE keeps queues short while the link is busy.",
            delta, bb.grade
        ),
        category: Category::Router,
        confidence,
        estimated_impact: format!(
            "Loaded latency from ~{:.0} ms towards ~{:.0} ms",
            bb.loaded_latency_ms,
            bb.idle_latency_ms * 1.2
        ),
        commands: vec![
            "opkg update && opkg install sqm-scripts luci-app-sqm".to_string(),
            "uci set sqm.@queue[0].enabled='1'".to_string(),
            format!("uci set sqm.@queue[0].download='{}'", download),
            format!("uci set sqm.@queue[0].upload='{}'", upload),
            "uci set sqm.@queue[0].qdisc='cake'".to_string(),
            "uci set sqm.@queue[0].script='piece_of_cake.qos'".to_string(),
            "uci commit sqm && /etc/init.d/sqm restart".to_string(),
        ],
        rollback_commands: strings(&[
            "uci set sqm.@queue[0].enabled='0'",
            "uci commit sqm && /etc/init.d/sqm restart",
        ]),
        requires_admin: true,
        reversible: true,
        risk_level: RiskLevel::Low,
    }
}

// Packet loss

fn packet_loss_applies(result: &BenchmarkResult, ctx: &RuleContext) -> bool {
    result.probe_succeeded(ProbeKind::Ping)
        && result.icmp.packet_loss > ctx.thresholds.packet_loss_percent
}

fn packet_loss_build(result: &BenchmarkResult, ctx: &RuleContext) -> Recommendation {
    let loss = result.icmp.packet_loss;
    let confidence = if loss > ctx.thresholds.packet_loss_high_confidence_percent {
        Confidence::High
    } else {
        Confidence::Medium
    };

    let target = &result.target;
    let commands = match ctx.os {
        HostOs::Linux => vec![
            "ip -s link show".to_string(),
            format!("mtr --report --report-cycles 100 {}", target),
        ],
        HostOs::Windows => vec![
            "Get-NetAdapterStatistics".to_string(),
            format!("pathping -q 100 {}", target),
        ],
        HostOs::MacOs => vec![
            "netstat -i".to_string(),
            format!("mtr --report --report-cycles 100 {}", target),
        ],
    };

    Recommendation {
        id: "investigate_packet_loss".to_string(),
        title: "Investigate packet loss".to_string(),
        description: format!(
            "{:.1}% of ICMP probes to {} were lost. Loss points at congestion, a \
             faulty cable or Wi-Fi link, or a problem upstream at the ISP.",
            loss, target
        ),
        category: Category::System,
        confidence,
        estimated_impact: "Fewer retransmissions and stalls once the lossy hop is fixed"
            .to_string(),
        commands,
        rollback_commands: strings(&["# Diagnostics only; nothing to revert"]),
        requires_admin: false,
        reversible: true,
        risk_level: RiskLevel::Low,
    }
}

// DNS

/// The system resolver and the fastest reachable alternative, when the
/// alternative beats it
fn dns_candidates(result: &BenchmarkResult) -> Option<(f64, &crate::models::DnsResolverResult)> {
    let current = result.system_resolver()?.median_ms?;
    let best = result
        .dns
        .iter()
        .filter(|d| d.reachable && !d.is_system)
        .filter_map(|d| d.median_ms.map(|m| (m, d)))
        .min_by(|a, b| a.0.total_cmp(&b.0))?;
    Some((current, best.1))
}

fn dns_applies(result: &BenchmarkResult, ctx: &RuleContext) -> bool {
    if !result.probe_succeeded(ProbeKind::Dns) {
        return false;
    }
    match dns_candidates(result) {
        Some((current, best)) => best
            .median_ms
            .map(|m| m < current - ctx.thresholds.dns_improvement_ms)
            .unwrap_or(false),
        None => false,
    }
}

fn dns_build(result: &BenchmarkResult, ctx: &RuleContext) -> Recommendation {
    let (current, best) = match dns_candidates(result) {
        Some(found) => found,
        None => return dns_fallback(),
    };
    let best_ms = best.median_ms.unwrap_or(current);
    let ip = best.resolver_ip;

    let (commands, rollback) = match ctx.os {
        HostOs::Linux => {
            let iface = interface_name(result, "eth0");
            (
                vec![format!("resolvectl dns {} {}", iface, ip)],
                vec![format!("resolvectl revert {}", iface)],
            )
        }
        HostOs::Windows => {
            let alias = interface_name(result, "Ethernet");
            (
                vec![format!(
                    "Set-DnsClientServerAddress -InterfaceAlias '{}' -ServerAddresses {}",
                    alias, ip
                )],
                vec![format!(
                    "Set-DnsClientServerAddress -InterfaceAlias '{}' -ResetServerAddresses",
                    alias
                )],
            )
        }
        HostOs::MacOs => (
            vec![format!("networksetup -setdnsservers Wi-Fi {}", ip)],
            strings(&["networksetup -setdnsservers Wi-Fi empty"]),
        ),
    };

    Recommendation {
        id: "dns_switch_resolver".to_string(),
        title: format!("Switch DNS resolver to {} ({})", best.resolver_name, ip),
        description: format!(
            "{} answers in {:.1} ms (median) against {:.1} ms for the resolver this \
             host currently uses.",
            best.resolver_name, best_ms, current
        ),
        category: Category::Dns,
        confidence: Confidence::Medium,
        estimated_impact: format!("~{:.0} ms faster name lookups", current - best_ms),
        commands,
        rollback_commands: rollback,
        requires_admin: true,
        reversible: true,
        risk_level: RiskLevel::Low,
    }
}

/// Only reachable if the builder runs without its predicate
fn dns_fallback() -> Recommendation {
    Recommendation {
        id: "dns_switch_resolver".to_string(),
        title: "Review DNS resolver".to_string(),
        description: "No resolver comparison is available.".to_string(),
        category: Category::Dns,
        confidence: Confidence::Low,
        estimated_impact: "Unknown".to_string(),
        commands: strings(&["# Re-run the DNS benchmark"]),
        rollback_commands: strings(&["# Nothing to revert"]),
        requires_admin: false,
        reversible: true,
        risk_level: RiskLevel::Low,
    }
}

// Jitter

fn jitter_applies(result: &BenchmarkResult, ctx: &RuleContext) -> bool {
    result.probe_succeeded(ProbeKind::Jitter)
        && result.jitter.mean_jitter_ms > ctx.thresholds.jitter_ms
}

fn jitter_build(result: &BenchmarkResult, ctx: &RuleContext) -> Recommendation {
    let (commands, rollback, requires_admin) = match ctx.os {
        HostOs::Linux => {
            let iface = interface_name(result, "eth0");
            (
                vec![format!("tc qdisc replace dev {} root fq_codel", iface)],
                vec![format!("tc qdisc del dev {} root", iface)],
                true,
            )
        }
        HostOs::Windows => (
            strings(&[
                "New-NetQosPolicy -Name 'ipo-realtime' -IPProtocolMatchCondition UDP -DSCPAction 46 -NetworkProfile All",
            ]),
            strings(&["Remove-NetQosPolicy -Name 'ipo-realtime' -Confirm:$false"]),
            true,
        ),
        HostOs::MacOs => (
            strings(&["# Enable SQM or QoS on the router; macOS exposes no queue discipline"]),
            strings(&["# No local changes to revert"]),
            false,
        ),
    };

    Recommendation {
        id: "reduce_jitter".to_string(),
        title: "Reduce jitter with fair queuing".to_string(),
        description: format!(
            "UDP jitter averages {:.1} ms, enough to disturb calls, games and \
             streaming.",
            result.jitter.mean_jitter_ms
        ),
        category: Category::System,
        confidence: Confidence::Medium,
        estimated_impact: "Steadier real-time traffic".to_string(),
        commands,
        rollback_commands: rollback,
        requires_admin,
        reversible: true,
        risk_level: RiskLevel::Low,
    }
}

// Receive-side scaling

fn rss_applies(result: &BenchmarkResult, ctx: &RuleContext) -> bool {
    let info = &result.system_info;
    match &info.nic {
        Some(nic) => info.logical_cores >= ctx.thresholds.rss_min_cores && !nic.rss_enabled,
        None => false,
    }
}

fn rss_build(result: &BenchmarkResult, ctx: &RuleContext) -> Recommendation {
    let iface = interface_name(result, "eth0");
    let cores = result.system_info.logical_cores;
    let current_queues = result
        .system_info
        .nic
        .as_ref()
        .map(|nic| nic.rx_queues)
        .unwrap_or(1);
    let channels = cores.min(8);

    let (commands, rollback, requires_admin) = match ctx.os {
        HostOs::Linux => (
            vec![
                format!("ethtool -l {}", iface),
                format!("ethtool -L {} combined {}", iface, channels),
            ],
            vec![format!("ethtool -L {} combined {}", iface, current_queues)],
            true,
        ),
        HostOs::Windows => (
            vec![format!("Enable-NetAdapterRss -Name '{}'", iface)],
            vec![format!("Disable-NetAdapterRss -Name '{}'", iface)],
            true,
        ),
        // The macOS driver manages receive queues itself
        HostOs::MacOs => (
            strings(&["# macOS exposes no receive-queue setting; no local change is available"]),
            strings(&["# No local changes to revert"]),
            false,
        ),
    };

    Recommendation {
        id: "nic_rss_enable".to_string(),
        title: format!("Enable receive-side scaling on {}", iface),
        description: format!(
            "{} uses {} receive queue(s) on a {}-core host. Spreading receive \
             processing across cores lifts throughput on fast links.",
            iface, current_queues, cores
        ),
        category: Category::Nic,
        confidence: Confidence::Medium,
        estimated_impact: "10-30% more throughput on links above 100 Mbps".to_string(),
        commands,
        rollback_commands: rollback,
        requires_admin,
        reversible: true,
        risk_level: RiskLevel::Medium,
    }
}
