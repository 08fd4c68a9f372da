//! `ipo info`: host facts and effective configuration

use anyhow::Result;
use ipo_core::probes::SystemInspector;
use serde_json::json;
use std::path::Path;

use crate::config::{default_store, load_config};
use crate::output::{print_info, print_json, print_system_info, OutputFormat};

pub async fn show_info(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = load_config(config_path)?;
    let system = SystemInspector::new().inspect().await;
    let artifact_dir = default_store()?.dir().display().to_string();

    match format {
        OutputFormat::Json => print_json(&json!({
            "system": system,
            "config": config,
            "config_file": config_path.map(|p| p.display().to_string()),
            "artifact_dir": artifact_dir,
        }))?,
        OutputFormat::Table => {
            print_system_info(&system);
            match config_path {
                Some(path) => print_info(&format!("Configuration: {}", path.display())),
                None => print_info("Configuration: defaults"),
            }
            print_info(&format!("Target: {}", config.target));
            print_info(&format!(
                "iperf3 server: {}:{}",
                config.iperf.server, config.iperf.port
            ));
            let resolvers: Vec<String> = config
                .dns
                .resolvers
                .iter()
                .map(|r| format!("{} ({})", r.name, r.ip))
                .collect();
            print_info(&format!("DNS resolvers: {}", resolvers.join(", ")));
            print_info(&format!("Artifacts: {}", artifact_dir));
        }
    }

    Ok(())
}
