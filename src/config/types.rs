//! Agent configuration structs, defaults and validation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wol::MacAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub agent: AgentSettings,
    pub target: TargetSettings,
    pub timing: TimingSettings,
    pub remote: RemoteSettings,
    pub power: PowerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSettings {
    pub host: String,                 // ssh alias, resolved through ~/.ssh/config
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,      // skips resolution when set
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_wake_port")]
    pub wake_port: u16,
}

pub fn default_broadcast_address() -> String { "255.255.255.255".to_string() }
pub fn default_wake_port() -> u16 { 9 }

/// All durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    pub ping_attempts: u32,
    pub wake_interval: f64,
    pub connect_retry_limit: u32,
    pub connect_retry_interval: f64,
    pub connect_timeout: f64,
    pub command_timeout: f64,
    pub power_poll_interval: f64,
    pub stats_poll_interval: f64,
    pub grace_period: f64,
    pub countdown_poll_interval: f64,
    pub shutdown_settle: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub shutdown_command: String,
    pub stats_command: String,
    #[serde(default = "default_telemetry_enabled")]
    pub telemetry_enabled: bool,
    pub control_dir: String,
}

pub fn default_telemetry_enabled() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSettings {
    pub supply_path: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent: AgentSettings {
                log_level: "INFO".to_string(),
            },
            target: TargetSettings {
                host: "[YOUR_SSH_HOST]".to_string(), // Placeholder forces user configuration
                mac_address: "00:00:00:00:00:00".to_string(),
                address: None,
                broadcast_address: default_broadcast_address(),
                wake_port: default_wake_port(),
            },
            timing: TimingSettings {
                ping_attempts: 4,
                wake_interval: 10.0,
                connect_retry_limit: 5,
                connect_retry_interval: 10.0,
                connect_timeout: 10.0,
                command_timeout: 30.0,
                power_poll_interval: 5.0,
                stats_poll_interval: 10.0,
                grace_period: 240.0,
                countdown_poll_interval: 1.0,
                shutdown_settle: 20.0,
            },
            remote: RemoteSettings {
                shutdown_command: "systemctl poweroff".to_string(),
                stats_command: "bd-client".to_string(),
                telemetry_enabled: true,
                control_dir: "/run/blackout-agent".to_string(),
            },
            power: PowerSettings {
                supply_path: "/sys/class/power_supply".to_string(),
            },
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("target.host is not configured")]
    MissingHost,

    #[error("target.mac_address is invalid: {0}")]
    InvalidMac(String),

    #[error("timing.{field} must be a positive number of seconds (got {value})")]
    NonPositive { field: &'static str, value: f64 },

    #[error("timing.{field} is out of range ({value} seconds)")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("timing.{0} must be at least 1")]
    ZeroCount(&'static str),

    #[error("timing.countdown_poll_interval ({countdown}s) must not exceed timing.power_poll_interval ({monitoring}s)")]
    SlowCountdown { countdown: f64, monitoring: f64 },

    #[error("remote.{0} must not be empty")]
    EmptyCommand(&'static str),
}

/// A timing value from the config file as a `Duration`.
pub fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ConfigError::NonPositive { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::OutOfRange { field, value })
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.host.trim().is_empty() || self.target.host.contains("[YOUR_SSH_HOST]") {
            return Err(ConfigError::MissingHost);
        }
        if let Err(e) = self.target.mac_address.parse::<MacAddress>() {
            return Err(ConfigError::InvalidMac(e.to_string()));
        }

        let t = &self.timing;
        let durations = [
            ("wake_interval", t.wake_interval),
            ("connect_retry_interval", t.connect_retry_interval),
            ("connect_timeout", t.connect_timeout),
            ("command_timeout", t.command_timeout),
            ("power_poll_interval", t.power_poll_interval),
            ("stats_poll_interval", t.stats_poll_interval),
            ("grace_period", t.grace_period),
            ("countdown_poll_interval", t.countdown_poll_interval),
            ("shutdown_settle", t.shutdown_settle),
        ];
        for (field, value) in durations {
            seconds(field, value)?;
        }
        if t.ping_attempts == 0 {
            return Err(ConfigError::ZeroCount("ping_attempts"));
        }
        if t.connect_retry_limit == 0 {
            return Err(ConfigError::ZeroCount("connect_retry_limit"));
        }
        if t.countdown_poll_interval > t.power_poll_interval {
            return Err(ConfigError::SlowCountdown {
                countdown: t.countdown_poll_interval,
                monitoring: t.power_poll_interval,
            });
        }

        if self.remote.shutdown_command.trim().is_empty() {
            return Err(ConfigError::EmptyCommand("shutdown_command"));
        }
        if self.remote.telemetry_enabled && self.remote.stats_command.trim().is_empty() {
            return Err(ConfigError::EmptyCommand("stats_command"));
        }
        Ok(())
    }
}
