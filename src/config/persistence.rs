//! Config file load, save and location logic.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::types::AgentConfig;

/// `config.json` next to the running executable.
pub fn default_config_path() -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()?
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Cannot determine executable directory"))?
        .to_path_buf();
    Ok(exe_dir.join("config.json"))
}

pub fn resolve_config_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => default_config_path(),
    }
}

/// Like `resolve_config_path`, anchored to the current directory so a
/// detached child or a systemd unit finds the same file.
pub fn absolute_config_path(path: Option<&Path>) -> Result<PathBuf> {
    let path = resolve_config_path(path)?;
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Load the config file, falling back to defaults when it does not exist.
/// The result is not validated; callers that start supervision must call `validate`.
pub async fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    let config_path = resolve_config_path(path)?;

    if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read {:?}", config_path))?;
        let config: AgentConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", config_path))?;

        if config.target.host.contains("[YOUR_SSH_HOST]") {
            warn!("⚠️ Target host is not configured in {:?}. Supervision cannot start.", config_path);
        }

        info!("Loaded configuration from: {:?}", config_path);
        Ok(config)
    } else {
        warn!("Config file {:?} not found, using defaults. Run with '--init-config' to create one.", config_path);
        Ok(AgentConfig::default())
    }
}

pub async fn save_config(config: &AgentConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("Configuration saved to: {:?}", path);
    Ok(())
}
