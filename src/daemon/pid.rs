use std::fs;
use std::path::Path;
use anyhow::Result;

use crate::daemon::{LOG_DIR, PID_FILE, RUN_DIR};

pub fn ensure_directories() -> Result<()> {
    fs::create_dir_all(RUN_DIR)?;
    fs::create_dir_all(LOG_DIR)?;
    Ok(())
}

pub fn get_pid() -> Result<Option<u32>> {
    if Path::new(PID_FILE).exists() {
        let content = fs::read_to_string(PID_FILE)?;
        let pid = content.trim().parse::<u32>()?;
        Ok(Some(pid))
    } else {
        Ok(None)
    }
}

/// Signal 0 probe.
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// True when the pid file names a live process. A stale file is removed.
pub fn is_running() -> bool {
    match get_pid() {
        Ok(Some(pid)) if process_alive(pid) => true,
        Ok(Some(_)) => {
            if let Err(e) = remove_pid_file() {
                eprintln!("Warning: Could not remove stale PID file: {}", e);
            }
            false
        }
        _ => false,
    }
}

pub fn save_pid(pid: u32) -> Result<()> {
    ensure_directories()?;
    fs::write(PID_FILE, pid.to_string())?;
    Ok(())
}

pub fn remove_pid_file() -> Result<()> {
    if Path::new(PID_FILE).exists() {
        fs::remove_file(PID_FILE)?;
    }
    Ok(())
}

/// Remove the pid file only if it still names this process.
pub fn release_own_pid() {
    if let Ok(Some(pid)) = get_pid() {
        if pid == std::process::id() {
            let _ = remove_pid_file();
        }
    }
}
