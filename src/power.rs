//! Local power source detection from the kernel's power_supply class.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Mains,
    /// Battery-backed or otherwise not on mains.
    Other,
}

#[async_trait]
pub trait PowerMonitor: Send + Sync {
    /// A host without any battery reports `Mains`. Errors are unexpected faults.
    async fn current_source(&self) -> Result<PowerSource>;
}

/// Reads `/sys/class/power_supply/*`.
pub struct SysfsPowerMonitor {
    base: PathBuf,
}

impl SysfsPowerMonitor {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        Ok(content.trim().to_string())
    }

    async fn optional(&self, path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }
        self.read_file(path).await.map(Some)
    }
}

#[async_trait]
impl PowerMonitor for SysfsPowerMonitor {
    async fn current_source(&self) -> Result<PowerSource> {
        if !self.base.exists() {
            return Ok(PowerSource::Mains);
        }

        let pattern = self.base.join("*");
        let pattern_str = pattern.to_string_lossy();
        let mut battery_discharging = false;
        let mut system_battery = false;
        let mut adapter_present = false;

        for supply in glob::glob(&pattern_str)?.filter_map(Result::ok) {
            let Some(kind) = self.optional(&supply.join("type")).await? else {
                continue;
            };

            match kind.as_str() {
                "Mains" | "USB" => {
                    adapter_present = true;
                    if self.optional(&supply.join("online")).await?.as_deref() == Some("1") {
                        trace!("{:?} online", supply);
                        return Ok(PowerSource::Mains);
                    }
                }
                "Battery" => {
                    // peripheral batteries (mice, headsets) say nothing about the host
                    if self.optional(&supply.join("scope")).await?.as_deref() == Some("Device") {
                        continue;
                    }
                    system_battery = true;
                    let status = self.optional(&supply.join("status")).await?;
                    trace!("{:?} status {:?}", supply, status);
                    if status.as_deref() == Some("Discharging") {
                        battery_discharging = true;
                    }
                }
                _ => {}
            }
        }

        // an offline adapter next to a battery means unplugged, whatever the
        // battery reports ("Not charging" and "Unknown" are common)
        Ok(if battery_discharging || (adapter_present && system_battery) {
            PowerSource::Other
        } else {
            PowerSource::Mains
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supply(root: &Path, name: &str, files: &[(&str, &str)]) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        for (file, value) in files {
            std::fs::write(dir.join(file), format!("{}\n", value)).unwrap();
        }
    }

    #[tokio::test]
    async fn no_supplies_means_mains() {
        let root = tempfile::tempdir().unwrap();
        let monitor = SysfsPowerMonitor::new(root.path());
        assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Mains);

        let missing = SysfsPowerMonitor::new(root.path().join("nope"));
        assert_eq!(missing.current_source().await.unwrap(), PowerSource::Mains);
    }

    #[tokio::test]
    async fn adapter_online_wins() {
        let root = tempfile::tempdir().unwrap();
        supply(root.path(), "AC", &[("type", "Mains"), ("online", "1")]);
        supply(root.path(), "BAT0", &[("type", "Battery"), ("status", "Charging")]);
        let monitor = SysfsPowerMonitor::new(root.path());
        assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Mains);
    }

    #[tokio::test]
    async fn discharging_battery_without_adapter_is_outage() {
        let root = tempfile::tempdir().unwrap();
        supply(root.path(), "AC", &[("type", "Mains"), ("online", "0")]);
        supply(root.path(), "BAT0", &[("type", "Battery"), ("status", "Discharging")]);
        let monitor = SysfsPowerMonitor::new(root.path());
        assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Other);
    }

    #[tokio::test]
    async fn offline_adapter_with_idle_battery_is_outage() {
        for status in ["Not charging", "Unknown", "Full"] {
            let root = tempfile::tempdir().unwrap();
            supply(root.path(), "ADP1", &[("type", "Mains"), ("online", "0")]);
            supply(root.path(), "BAT0", &[("type", "Battery"), ("status", status)]);
            let monitor = SysfsPowerMonitor::new(root.path());
            assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Other, "{}", status);
        }
    }

    #[tokio::test]
    async fn offline_adapter_without_battery_is_mains() {
        let root = tempfile::tempdir().unwrap();
        supply(root.path(), "ADP1", &[("type", "Mains"), ("online", "0")]);
        let monitor = SysfsPowerMonitor::new(root.path());
        assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Mains);
    }

    #[tokio::test]
    async fn full_battery_is_mains() {
        let root = tempfile::tempdir().unwrap();
        supply(root.path(), "BAT0", &[("type", "Battery"), ("status", "Full")]);
        let monitor = SysfsPowerMonitor::new(root.path());
        assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Mains);
    }

    #[tokio::test]
    async fn device_batteries_are_ignored() {
        let root = tempfile::tempdir().unwrap();
        supply(
            root.path(),
            "hidpp_battery_0",
            &[("type", "Battery"), ("scope", "Device"), ("status", "Discharging")],
        );
        let monitor = SysfsPowerMonitor::new(root.path());
        assert_eq!(monitor.current_source().await.unwrap(), PowerSource::Mains);
    }
}
