//! OpenSSH control-master transport.
//! The master process holds the authenticated connection; commands are multiplexed over its socket.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, trace, warn};

use crate::error::{CommandError, ConnectError};
use crate::remote::{RemoteSession, RemoteTransport};
use crate::target::SupervisedTarget;

/// ssh reserves this exit code for its own failures.
const SSH_CHANNEL_FAILURE: i32 = 255;
const READY_POLL: Duration = Duration::from_millis(200);

pub struct SshTransport {
    control_dir: PathBuf,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshTransport {
    pub fn new(control_dir: impl Into<PathBuf>, connect_timeout: Duration, command_timeout: Duration) -> Self {
        Self {
            control_dir: control_dir.into(),
            connect_timeout,
            command_timeout,
        }
    }

    fn control_path(&self, host: &str) -> PathBuf {
        let safe: String = host
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.control_dir.join(format!("{}.sock", safe))
    }

    fn master_command(&self, host: &str, control_path: &Path) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(["-M", "-N", "-o", "BatchMode=yes", "-o", "ControlMaster=yes"])
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)))
            .args(["-o", "ServerAliveInterval=5", "-o", "ServerAliveCountMax=3"])
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// `ssh -S <socket> -O <op> host`
fn control_command(host: &str, control_path: &Path, op: &str) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.arg("-S")
        .arg(control_path)
        .args(["-O", op])
        .arg(host)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    cmd
}

async fn master_ready(host: &str, control_path: &Path) -> bool {
    control_command(host, control_path, "check")
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn stderr_of(child: &mut Child) -> String {
    use tokio::io::AsyncReadExt;
    let mut buf = String::new();
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut buf).await;
    }
    buf.trim().to_string()
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn connect(&self, target: &SupervisedTarget) -> Result<Box<dyn RemoteSession>, ConnectError> {
        tokio::fs::create_dir_all(&self.control_dir).await?;
        let control_path = self.control_path(&target.host);
        // a stale socket from a killed master would make ssh refuse to bind
        let _ = tokio::fs::remove_file(&control_path).await;

        debug!("Opening ssh control master to {}", target.host);
        let mut master = self.master_command(&target.host, &control_path).spawn()?;

        let deadline = time::Instant::now() + self.connect_timeout;
        loop {
            if let Some(status) = master.try_wait()? {
                let reason = stderr_of(&mut master).await;
                return Err(ConnectError::Refused {
                    host: target.host.clone(),
                    reason: if reason.is_empty() { format!("ssh exited with {}", status) } else { reason },
                });
            }
            if master_ready(&target.host, &control_path).await {
                break;
            }
            if time::Instant::now() >= deadline {
                let _ = master.kill().await;
                return Err(ConnectError::Timeout {
                    host: target.host.clone(),
                    timeout: self.connect_timeout,
                });
            }
            time::sleep(READY_POLL).await;
        }

        Ok(Box::new(SshSession {
            host: target.host.clone(),
            control_path,
            command_timeout: self.command_timeout,
            master: Some(master),
        }))
    }
}

pub struct SshSession {
    host: String,
    control_path: PathBuf,
    command_timeout: Duration,
    master: Option<Child>,
}

impl SshSession {
    fn exec_command(&self, command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-S")
            .arg(&self.control_path)
            .args(["-o", "BatchMode=yes"])
            .arg(&self.host)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &str) -> Result<String, CommandError> {
        trace!("Executing: ssh {} -- {}", self.host, command);

        let output = time::timeout(self.command_timeout, self.exec_command(command).output())
            .await
            .map_err(|_| CommandError::Timeout {
                command: command.to_string(),
                timeout: self.command_timeout,
            })??;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            Some(SSH_CHANNEL_FAILURE) | None => Err(CommandError::Channel {
                command: command.to_string(),
                stderr,
            }),
            Some(code) => Err(CommandError::Failed {
                command: command.to_string(),
                code,
                stderr,
            }),
        }
    }

    async fn is_alive(&self) -> bool {
        master_ready(&self.host, &self.control_path).await
    }

    async fn close(&mut self) {
        let _ = time::timeout(
            self.command_timeout,
            control_command(&self.host, &self.control_path, "exit").status(),
        )
        .await;
        if let Some(mut master) = self.master.take() {
            if let Err(e) = master.kill().await {
                trace!("ssh master already gone: {}", e);
            }
        }
        if let Err(e) = tokio::fs::remove_file(&self.control_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove control socket {:?}: {}", self.control_path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &Command) -> Vec<String> {
        cmd.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn control_path_is_sanitised() {
        let transport = SshTransport::new("/run/x", Duration::from_secs(10), Duration::from_secs(30));
        assert_eq!(transport.control_path("admin@nas.lan"), PathBuf::from("/run/x/admin_nas.lan.sock"));
    }

    #[test]
    fn master_uses_batch_mode_and_control_socket() {
        let transport = SshTransport::new("/run/x", Duration::from_secs(7), Duration::from_secs(30));
        let a = args(&transport.master_command("nas", Path::new("/run/x/nas.sock")));
        assert!(a.contains(&"BatchMode=yes".to_string()));
        assert!(a.contains(&"ControlPath=/run/x/nas.sock".to_string()));
        assert!(a.contains(&"ConnectTimeout=7".to_string()));
        assert_eq!(a.last().map(String::as_str), Some("nas"));
    }

    #[test]
    fn exec_goes_through_master_socket() {
        let session = SshSession {
            host: "nas".to_string(),
            control_path: PathBuf::from("/run/x/nas.sock"),
            command_timeout: Duration::from_secs(30),
            master: None,
        };
        let a = args(&session.exec_command("systemctl poweroff"));
        assert_eq!(a[..2], ["-S".to_string(), "/run/x/nas.sock".to_string()]);
        assert_eq!(a[a.len() - 2..], ["--".to_string(), "systemctl poweroff".to_string()]);
    }
}
