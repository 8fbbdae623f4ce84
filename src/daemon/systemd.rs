//! systemd unit for boot-time supervision. The unit runs the agent in the
//! foreground against one absolute config file.

use std::fs;
use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};

use crate::config::persistence::{absolute_config_path, load_config};
use crate::config::types::{seconds, AgentConfig};
use crate::daemon::{RUN_DIR, SERVICE_NAME, SYSTEMD_SERVICE_PATH, SYSTEMD_SERVICE_TEMPLATE};

/// Headroom past the command timeout for closing the channel and exiting.
const STOP_MARGIN_SECS: u64 = 15;

pub fn has_systemd() -> bool {
    Path::new("/run/systemd/system").exists()
}

/// Run `systemctl` and report success. A missing binary counts as failure.
pub fn systemctl(args: &[&str]) -> bool {
    process::Command::new("systemctl")
        .args(args)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// True when the installed unit is active or activating.
pub fn is_systemd_service_active() -> bool {
    has_systemd() && Path::new(SYSTEMD_SERVICE_PATH).exists() && systemctl(&["is-active", "--quiet", SERVICE_NAME])
}

fn require_root(flag: &str) -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        bail!("Root privileges required. Run with: sudo ./blackout-agent {}", flag);
    }
    Ok(())
}

/// Fill the unit template for `config`, read from `config_path`.
pub fn render_unit(exe_path: &Path, config_path: &Path, config: &AgentConfig) -> Result<String> {
    let command_timeout = seconds("command_timeout", config.timing.command_timeout)?;
    let stop_timeout = command_timeout.as_secs() + 1 + STOP_MARGIN_SECS;
    Ok(SYSTEMD_SERVICE_TEMPLATE
        .replace("{{EXEC_PATH}}", &exe_path.display().to_string())
        .replace("{{CONFIG_PATH}}", &config_path.display().to_string())
        .replace("{{STOP_TIMEOUT}}", &stop_timeout.to_string()))
}

/// systemd owns `RUN_DIR` through `RuntimeDirectory=` and wipes it on stop.
fn control_dir_note(config: &AgentConfig) -> Option<String> {
    let dir = Path::new(&config.remote.control_dir);
    if dir.starts_with(RUN_DIR) {
        None
    } else {
        Some(format!(
            "remote.control_dir {:?} is outside {}; stale ssh sockets there survive restarts",
            dir, RUN_DIR
        ))
    }
}

/// Install or refresh the unit (idempotent). The config must exist and validate.
pub async fn install_systemd_service(config_file: Option<&Path>) -> Result<()> {
    require_root("--install-service")?;

    if !has_systemd() {
        println!("❌ systemd not detected on this system.");
        println!("   The agent can still run manually with: ./blackout-agent --start");
        return Ok(());
    }

    let config_path = absolute_config_path(config_file)?;
    if !config_path.exists() {
        bail!("Configuration file not found: {:?}. Run --init-config first", config_path);
    }
    let config = load_config(Some(&config_path)).await?;
    config
        .validate()
        .with_context(|| format!("Not installing a unit for {:?}", config_path))?;
    if let Some(note) = control_dir_note(&config) {
        println!("⚠ {}", note);
    }

    let service_content = render_unit(&std::env::current_exe()?, &config_path, &config)?;
    let service_path = Path::new(SYSTEMD_SERVICE_PATH);
    if fs::read_to_string(service_path).ok().as_deref() == Some(service_content.as_str()) {
        println!("✓ Service is already installed and up-to-date");
        return Ok(());
    }

    fs::write(service_path, &service_content).context("Failed to write service file")?;
    println!("✓ Service file written: {} (config {:?})", SYSTEMD_SERVICE_PATH, config_path);

    if systemctl(&["daemon-reload"]) {
        println!("✓ Systemd daemon reloaded");
    } else {
        println!("⚠ Failed to reload systemd daemon (run: systemctl daemon-reload)");
    }
    if systemctl(&["enable", SERVICE_NAME]) {
        println!("✓ Service enabled (will start on boot)");
    } else {
        println!("⚠ Failed to enable service (run: systemctl enable {})", SERVICE_NAME);
    }

    println!();
    println!("Start now with: sudo systemctl start {}", SERVICE_NAME);
    Ok(())
}

pub fn uninstall_systemd_service() -> Result<()> {
    require_root("--uninstall-service")?;

    let service_path = Path::new(SYSTEMD_SERVICE_PATH);
    if !has_systemd() || !service_path.exists() {
        println!("✓ Service is not installed");
        return Ok(());
    }

    // stop waits out TimeoutStopSec, so an in-flight shutdown command still completes
    systemctl(&["stop", SERVICE_NAME]);
    systemctl(&["disable", SERVICE_NAME]);
    fs::remove_file(service_path)?;
    systemctl(&["daemon-reload"]);
    println!("✓ Service stopped, disabled and removed");
    Ok(())
}
