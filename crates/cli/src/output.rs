//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use ipo_core::models::{
    BenchmarkResult, BufferbloatGrade, ProbeKind, ProbeStatus, RunState, SystemInfo,
};
use ipo_core::recommend::{Confidence, Recommendation, RiskLevel};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a table with the shared style
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a latency value
pub fn format_ms(ms: f64) -> String {
    format!("{:.1} ms", ms)
}

/// Format a loss percentage
pub fn format_percent(pct: f64) -> String {
    format!("{:.1}%", pct)
}

/// Color a bufferbloat grade
pub fn color_grade(grade: BufferbloatGrade) -> String {
    let label = grade.to_string();
    match grade {
        BufferbloatGrade::APlus | BufferbloatGrade::A => label.green().bold().to_string(),
        BufferbloatGrade::B => label.green().to_string(),
        BufferbloatGrade::C => label.yellow().to_string(),
        BufferbloatGrade::D | BufferbloatGrade::F => label.red().bold().to_string(),
        BufferbloatGrade::Unknown => label.dimmed().to_string(),
    }
}

/// Color a recommendation confidence
pub fn color_confidence(confidence: Confidence) -> String {
    let label = confidence.to_string();
    match confidence {
        Confidence::High => label.green().to_string(),
        Confidence::Medium => label.yellow().to_string(),
        Confidence::Low => label.red().to_string(),
    }
}

/// Color a risk level
pub fn color_risk(risk: RiskLevel) -> String {
    let label = risk.to_string();
    match risk {
        RiskLevel::Low => label.green().to_string(),
        RiskLevel::Medium => label.yellow().to_string(),
        RiskLevel::High => label.red().to_string(),
    }
}

/// Color a run state
pub fn color_state(state: RunState) -> String {
    let label = state.to_string();
    match state {
        RunState::Complete => label.green().to_string(),
        RunState::Partial => label.yellow().to_string(),
        RunState::Failed => label.red().to_string(),
        RunState::Pending | RunState::Running => label,
    }
}

fn color_probe_status(status: ProbeStatus) -> String {
    match status {
        ProbeStatus::Succeeded => "ok".green().to_string(),
        ProbeStatus::Skipped => "skipped".dimmed().to_string(),
        ProbeStatus::Failed => "failed".red().to_string(),
    }
}

/// Row for the measurement summary table
#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

impl MetricRow {
    fn new(metric: &str, value: String) -> Self {
        Self {
            metric: metric.to_string(),
            value,
        }
    }
}

/// Row for the DNS resolver table
#[derive(Tabled)]
struct ResolverRow {
    #[tabled(rename = "Resolver")]
    name: String,
    #[tabled(rename = "Address")]
    ip: String,
    #[tabled(rename = "Median")]
    median: String,
    #[tabled(rename = "P95")]
    p95: String,
    #[tabled(rename = "Success")]
    success: String,
}

/// Row for the probe status table
#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "Probe")]
    probe: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Row for the recommendation table
#[derive(Tabled)]
struct RecommendationRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Recommendation")]
    title: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Admin")]
    admin: String,
}

fn measurement_rows(result: &BenchmarkResult) -> Vec<MetricRow> {
    let mut rows = Vec::new();
    let icmp = &result.icmp;
    rows.push(MetricRow::new(
        "Latency p50 / p95 / p99",
        format!(
            "{} / {} / {}",
            format_ms(icmp.p50),
            format_ms(icmp.p95),
            format_ms(icmp.p99)
        ),
    ));
    rows.push(MetricRow::new(
        "Latency min / max",
        format!("{} / {}", format_ms(icmp.min), format_ms(icmp.max)),
    ));
    rows.push(MetricRow::new("Packet loss", format_percent(icmp.packet_loss)));

    if result.probe_succeeded(ProbeKind::Throughput) {
        let t = &result.throughput;
        rows.push(MetricRow::new(
            "Download / upload",
            format!("{:.1} / {:.1} Mbps", t.download_mbps, t.upload_mbps),
        ));
        rows.push(MetricRow::new("TCP retransmits", t.retransmits.to_string()));
    }
    if result.probe_succeeded(ProbeKind::Jitter) {
        rows.push(MetricRow::new("Jitter", format_ms(result.jitter.mean_jitter_ms)));
        rows.push(MetricRow::new(
            "UDP loss",
            format_percent(result.jitter.packet_loss_percent),
        ));
    }
    if let Some(best) = result.fastest_resolver() {
        rows.push(MetricRow::new(
            "Fastest resolver",
            format!(
                "{} ({})",
                best.resolver_name,
                best.median_ms.map(format_ms).unwrap_or_default()
            ),
        ));
    }
    if result.probe_succeeded(ProbeKind::Bufferbloat) {
        let bb = &result.bufferbloat;
        rows.push(MetricRow::new(
            "Idle / loaded latency",
            format!(
                "{} / {}",
                format_ms(bb.idle_latency_ms),
                format_ms(bb.loaded_latency_ms)
            ),
        ));
        rows.push(MetricRow::new(
            "Bufferbloat",
            format!("{} (+{})", color_grade(bb.grade), format_ms(bb.latency_increase_ms)),
        ));
        if bb.loaded_loss_percent > 0.0 {
            rows.push(MetricRow::new(
                "Loss under load",
                format_percent(bb.loaded_loss_percent),
            ));
        }
    }
    rows
}

/// Print a benchmark result
pub fn print_result(result: &BenchmarkResult) {
    println!(
        "\n{} {} ({})",
        "Benchmark".bold(),
        result.target,
        color_state(result.state)
    );
    println!(
        "Started {}, took {:.1}s",
        result.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        result.duration_ms as f64 / 1000.0
    );

    print_table(measurement_rows(result));

    if !result.dns.is_empty() {
        let rows: Vec<ResolverRow> = result
            .dns
            .iter()
            .map(|d| ResolverRow {
                name: if d.is_system {
                    format!("{} (system)", d.resolver_name)
                } else {
                    d.resolver_name.clone()
                },
                ip: d.resolver_ip.to_string(),
                median: d
                    .median_ms
                    .map(format_ms)
                    .unwrap_or_else(|| "unreachable".red().to_string()),
                p95: d.p95_ms.map(format_ms).unwrap_or_else(|| "-".to_string()),
                success: format_percent(d.success_rate),
            })
            .collect();
        println!("\n{}", "DNS resolvers".bold());
        print_table(rows);
    }

    if !result.probes.is_empty() {
        let rows: Vec<ProbeRow> = result
            .probes
            .iter()
            .map(|p| ProbeRow {
                probe: p.probe.to_string(),
                status: color_probe_status(p.status),
                duration: format!("{:.1}s", p.duration_ms as f64 / 1000.0),
                detail: p.message.clone().unwrap_or_default(),
            })
            .collect();
        println!("\n{}", "Probes".bold());
        print_table(rows);
    }

    for warning in &result.warnings {
        print_warning(warning);
    }
}

/// Print recommendations with their commands
pub fn print_recommendations(recommendations: &[Recommendation]) {
    if recommendations.is_empty() {
        print_success("No recommendations: the connection looks healthy");
        return;
    }

    let rows: Vec<RecommendationRow> = recommendations
        .iter()
        .enumerate()
        .map(|(i, r)| RecommendationRow {
            rank: i + 1,
            category: r.category.to_string(),
            title: r.title.clone(),
            confidence: color_confidence(r.confidence),
            risk: color_risk(r.risk_level),
            admin: (if r.requires_admin { "yes" } else { "no" }).to_string(),
        })
        .collect();
    println!("\n{}", "Recommendations".bold());
    print_table(rows);

    for (i, r) in recommendations.iter().enumerate() {
        println!("\n{} {}", format!("{}.", i + 1).bold(), r.title.bold());
        if !r.description.is_empty() {
            println!("   {}", r.description);
        }
        println!("   Impact: {}", r.estimated_impact);
        println!("   Apply:");
        for command in &r.commands {
            println!("     {}", command.cyan());
        }
        println!("   Rollback:");
        for command in &r.rollback_commands {
            println!("     {}", command.dimmed());
        }
    }
}

/// Print host facts
pub fn print_system_info(info: &SystemInfo) {
    let mut rows = vec![
        MetricRow::new("OS", format!("{} ({})", info.os, info.arch)),
        MetricRow::new("Logical cores", info.logical_cores.to_string()),
    ];
    match &info.nic {
        Some(nic) => {
            rows.push(MetricRow::new("Primary interface", nic.name.clone()));
            rows.push(MetricRow::new("RX queues", nic.rx_queues.to_string()));
            rows.push(MetricRow::new(
                "RSS",
                (if nic.rss_enabled { "enabled" } else { "disabled" }).to_string(),
            ));
        }
        None => rows.push(MetricRow::new("Primary interface", "unknown".to_string())),
    }
    print_table(rows);
}
