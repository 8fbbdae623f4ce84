//! `--start` / `--stop` for the detached agent.

use std::fs;
use std::path::Path;
use std::process;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::config::persistence::{absolute_config_path, load_config};
use crate::daemon::pid::{ensure_directories, get_pid, is_running, process_alive, remove_pid_file, save_pid};
use crate::daemon::systemd::{is_systemd_service_active, systemctl};
use crate::daemon::{LOG_DIR, SERVICE_NAME};

const STOP_GRACE: Duration = Duration::from_secs(10);
const STOP_POLL: Duration = Duration::from_millis(200);

/// Validate the configuration, then detach a `--daemon-child` writing to the agent log.
pub async fn start_daemon(config_file: Option<&Path>, log_level: Option<&str>) -> Result<()> {
    if is_running() {
        bail!("Agent is already running (PID: {:?})", get_pid()?);
    }

    let config_path = absolute_config_path(config_file)?;
    if !config_path.exists() {
        bail!(
            "Configuration file not found: {:?}\nCreate one first: ./blackout-agent --init-config",
            config_path
        );
    }
    // a bad config would only surface in the log file
    let config = load_config(Some(&config_path)).await?;
    config
        .validate()
        .with_context(|| format!("Refusing to start with {:?}", config_path))?;

    println!("\x1b[32mStarting blackout-agent v{} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);

    ensure_directories()?;
    let log_path = Path::new(LOG_DIR).join("agent.log");
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Cannot open {:?}", log_path))?;

    let child = daemon_command(&std::env::current_exe()?, &config_path, log_level)
        .stdout(log_file.try_clone()?)
        .stderr(log_file)
        .spawn()?;
    save_pid(child.id())?;

    println!("Supervising {} (PID: {})", config.target.host, child.id());
    println!("Logs: tail -f {}", log_path.display());
    Ok(())
}

fn daemon_command(exe: &Path, config_path: &Path, log_level: Option<&str>) -> process::Command {
    let mut cmd = process::Command::new(exe);
    cmd.arg("--daemon-child").arg("--config-file").arg(config_path);
    if let Some(level) = log_level {
        cmd.arg("--log-level").arg(level);
    }
    cmd.current_dir("/").stdin(process::Stdio::null());
    cmd
}

pub fn stop_daemon() -> Result<()> {
    // systemd would restart a process killed behind its back
    if is_systemd_service_active() {
        println!("Agent is managed by systemd. Using systemctl stop...");
        if systemctl(&["stop", SERVICE_NAME]) {
            println!("Agent stopped via systemd");
            return Ok(());
        }
        eprintln!("WARNING: systemctl stop failed, falling back to the pid file");
    }

    let pid = match get_pid()? {
        Some(pid) if is_running() => pid,
        _ => bail!("Agent is not running"),
    };

    println!("Stopping Blackout Agent (PID: {})...", pid);
    if terminate(pid, STOP_GRACE) {
        println!("Agent stopped");
    } else {
        println!("WARNING: Agent ignored SIGTERM for {:?} and was killed", STOP_GRACE);
    }
    remove_pid_file()
}

/// SIGTERM, then SIGKILL once `grace` runs out. True when the process exited on its own.
fn terminate(pid: u32, grace: Duration) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !process_alive(pid) {
            return true;
        }
        std::thread::sleep(STOP_POLL);
    }

    unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    false
}
