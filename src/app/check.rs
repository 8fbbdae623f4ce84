//! One-shot `--check` diagnostics: config, resolution, power source, reachability.

use std::path::Path;

use anyhow::Result;

use crate::config::persistence::{load_config, resolve_config_path};
use crate::config::resolve::{default_ssh_config, resolve_address};
use crate::config::types::AgentConfig;
use crate::daemon::pid::{get_pid, is_running};
use crate::power::{PowerMonitor, PowerSource, SysfsPowerMonitor};
use crate::probe::{PingProber, Prober};
use crate::target::SupervisedTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub verdict: Verdict,
    pub label: &'static str,
    pub detail: String,
}

impl Finding {
    fn new(verdict: Verdict, label: &'static str, detail: impl Into<String>) -> Self {
        Self { verdict, label, detail: detail.into() }
    }
}

pub async fn diagnose(
    config: &AgentConfig,
    ssh_config: Option<&Path>,
    prober: &dyn Prober,
    power: &dyn PowerMonitor,
) -> Vec<Finding> {
    let mut findings = Vec::new();

    match config.validate() {
        Ok(()) => findings.push(Finding::new(Verdict::Pass, "Configuration", "valid")),
        Err(e) => findings.push(Finding::new(Verdict::Fail, "Configuration", e.to_string())),
    }

    match power.current_source().await {
        Ok(PowerSource::Mains) => findings.push(Finding::new(Verdict::Pass, "Power source", "mains")),
        Ok(PowerSource::Other) => findings.push(Finding::new(Verdict::Warn, "Power source", "battery")),
        Err(e) => findings.push(Finding::new(Verdict::Fail, "Power source", format!("{:#}", e))),
    }

    let address = match resolve_address(&config.target, ssh_config).await {
        Ok(ip) => {
            findings.push(Finding::new(Verdict::Pass, "Target address", format!("{} -> {}", config.target.host, ip)));
            ip
        }
        Err(e) => {
            findings.push(Finding::new(Verdict::Fail, "Target address", format!("{:#}", e)));
            return findings;
        }
    };

    let target = match SupervisedTarget::from_config(config, address) {
        Ok(target) => target,
        Err(e) => {
            findings.push(Finding::new(Verdict::Fail, "Target", format!("{:#}", e)));
            return findings;
        }
    };

    if prober.probe(target.address, target.timings.ping_attempts).await {
        findings.push(Finding::new(Verdict::Pass, "Reachability", format!("{} answers", target.address)));
    } else {
        findings.push(Finding::new(
            Verdict::Warn,
            "Reachability",
            format!("{} did not answer {} probes (asleep?)", target.address, target.timings.ping_attempts),
        ));
    }

    findings
}

/// Print the findings. Returns false when anything failed.
pub async fn run_check(config_file: Option<&Path>) -> Result<bool> {
    println!("\x1b[32mblackout-agent v{} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
    println!("Health Check");
    println!("============\n");

    let config_path = resolve_config_path(config_file)?;
    if config_path.exists() {
        println!("✓ Config file: {}", config_path.display());
    } else {
        println!("✗ Config file: NOT FOUND ({})", config_path.display());
        println!("  Run: ./blackout-agent --init-config");
        return Ok(false);
    }

    let config = load_config(Some(&config_path)).await?;
    let power = SysfsPowerMonitor::new(&config.power.supply_path);
    let ssh_config = default_ssh_config();
    let findings = diagnose(&config, ssh_config.as_deref(), &PingProber, &power).await;

    for finding in &findings {
        let mark = match finding.verdict {
            Verdict::Pass => "✓",
            Verdict::Warn => "⚠",
            Verdict::Fail => "✗",
        };
        println!("{} {}: {}", mark, finding.label, finding.detail);
    }

    if is_running() {
        if let Ok(Some(pid)) = get_pid() {
            println!("✓ Agent status: Running (PID: {})", pid);
        }
    } else {
        println!("- Agent status: Not running");
    }

    let all_ok = findings.iter().all(|f| f.verdict != Verdict::Fail);
    println!();
    if all_ok {
        println!("\x1b[32m✓ All checks passed!\x1b[0m");
    } else {
        println!("\x1b[31m✗ Supervision cannot start - see above\x1b[0m");
    }
    Ok(all_ok)
}
