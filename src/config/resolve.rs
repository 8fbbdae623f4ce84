//! Resolve the target's symbolic host to a network address.
//! Order: explicit `target.address`, `HostName` from ~/.ssh/config, then DNS.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

use crate::config::types::TargetSettings;

pub fn default_ssh_config() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("config"))
}

/// `HostName` of the first `Host` block whose patterns match `alias`.
pub fn ssh_hostname(content: &str, alias: &str) -> Option<String> {
    let mut in_matching_block = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once(|c: char| c.is_whitespace() || c == '=') {
            Some((k, v)) => (k, v.trim_start_matches(|c: char| c.is_whitespace() || c == '=').trim()),
            None => continue,
        };

        match key.to_ascii_lowercase().as_str() {
            "host" => {
                let patterns: Vec<&str> = value.split_whitespace().collect();
                let negated = patterns
                    .iter()
                    .filter_map(|p| p.strip_prefix('!'))
                    .any(|p| pattern_matches(p, alias));
                in_matching_block = !negated
                    && patterns.iter().filter(|p| !p.starts_with('!')).any(|p| pattern_matches(p, alias));
            }
            "match" => in_matching_block = false,
            "hostname" if in_matching_block => {
                return Some(value.trim_matches('"').replace("%h", alias));
            }
            _ => {}
        }
    }
    None
}

/// ssh_config glob: `*` any run, `?` one character. Unparsable patterns never match.
fn pattern_matches(pattern: &str, alias: &str) -> bool {
    glob::Pattern::new(pattern).map(|p| p.matches(alias)).unwrap_or(false)
}

async fn lookup(name: &str) -> Result<IpAddr> {
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Ok(ip);
    }
    let mut addrs = tokio::net::lookup_host((name, 22))
        .await
        .with_context(|| format!("Failed to resolve '{}'", name))?;
    addrs
        .next()
        .map(|a| a.ip())
        .ok_or_else(|| anyhow!("'{}' resolved to no addresses", name))
}

/// Startup-time resolution. Any failure here is fatal for the agent.
pub async fn resolve_address(target: &TargetSettings, ssh_config: Option<&Path>) -> Result<IpAddr> {
    if let Some(address) = target.address.as_deref() {
        return lookup(address).await;
    }

    let mut name = target.host.clone();
    if let Some(path) = ssh_config {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {:?}", path))?;
            if let Some(hostname) = ssh_hostname(&content, &target.host) {
                debug!("{} maps to {} in {:?}", target.host, hostname, path);
                name = hostname;
            }
        }
    }

    let ip = lookup(&name).await?;
    info!("Resolved {} to {}", target.host, ip);
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SSH_CONFIG: &str = r#"
# homelab
Host router
    HostName 192.168.1.1

Host nas nas-backup
    User admin
    HostName 192.168.1.20

Host *.lan !printer.lan
    HostName %h.example.net

Host *
    ServerAliveInterval 30
"#;

    #[test]
    fn finds_hostname_for_alias() {
        assert_eq!(ssh_hostname(SSH_CONFIG, "nas").as_deref(), Some("192.168.1.20"));
        assert_eq!(ssh_hostname(SSH_CONFIG, "nas-backup").as_deref(), Some("192.168.1.20"));
        assert_eq!(ssh_hostname(SSH_CONFIG, "router").as_deref(), Some("192.168.1.1"));
    }

    #[test]
    fn wildcard_and_negation() {
        assert_eq!(ssh_hostname(SSH_CONFIG, "box.lan").as_deref(), Some("box.lan.example.net"));
        assert_eq!(ssh_hostname(SSH_CONFIG, "printer.lan"), None);
        assert_eq!(ssh_hostname(SSH_CONFIG, "unknown"), None);
    }

    #[test]
    fn wildcard_heavy_host_line_matches_quickly() {
        let pattern = format!("{}*b", "*a".repeat(14));
        let content = format!("Host {}\n    HostName 10.0.0.9\n\nHost a*\n    HostName 10.0.0.10\n", pattern);
        let alias = "a".repeat(40);

        let started = std::time::Instant::now();
        assert_eq!(ssh_hostname(&content, &alias).as_deref(), Some("10.0.0.10"));
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn malformed_pattern_is_skipped() {
        let content = "Host [nas\n    HostName 10.0.0.1\n\nHost nas\n    HostName 10.0.0.2\n";
        assert_eq!(ssh_hostname(content, "nas").as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn equals_separator() {
        assert_eq!(ssh_hostname("Host=pi\nHostName=10.0.0.5\n", "pi").as_deref(), Some("10.0.0.5"));
    }

    #[tokio::test]
    async fn explicit_address_skips_ssh_config() {
        let target = TargetSettings {
            host: "nas".into(),
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            address: Some("10.1.2.3".into()),
            broadcast_address: "255.255.255.255".into(),
            wake_port: 9,
        };
        let ip = resolve_address(&target, None).await.unwrap();
        assert_eq!(ip, "10.1.2.3".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn alias_resolved_through_ssh_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, SSH_CONFIG).unwrap();
        let target = TargetSettings {
            host: "nas".into(),
            mac_address: "aa:bb:cc:dd:ee:ff".into(),
            address: None,
            broadcast_address: "255.255.255.255".into(),
            wake_port: 9,
        };
        let ip = resolve_address(&target, Some(&path)).await.unwrap();
        assert_eq!(ip, "192.168.1.20".parse::<IpAddr>().unwrap());
    }
}
