//! Network reachability probing, independent of the control channel.

use std::net::IpAddr;
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{error, trace};

#[async_trait]
pub trait Prober: Send + Sync {
    /// True when the address answered at least one of `attempts` probes.
    async fn probe(&self, address: IpAddr, attempts: u32) -> bool;
}

/// Probes with the system `ping` binary.
pub struct PingProber;

impl PingProber {
    fn command(address: IpAddr, attempts: u32) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("ping");
        if address.is_ipv6() {
            cmd.arg("-6");
        }
        cmd.args(["-c", &attempts.to_string(), "-W", "1"])
            .arg(address.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: IpAddr, attempts: u32) -> bool {
        trace!("Executing: ping -c {} {}", attempts, address);
        match Self::command(address, attempts).status().await {
            Ok(status) => status.success(),
            Err(e) => {
                error!("Failed to execute ping: {}", e);
                false
            }
        }
    }
}
