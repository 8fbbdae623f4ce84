//! The supervised remote machine and the cadences used to watch it.

use std::net::IpAddr;
use std::time::Duration;

use crate::config::types::{seconds, AgentConfig, ConfigError, TimingSettings};
use crate::wol::MacAddress;

#[derive(Debug, Clone, PartialEq)]
pub struct Timings {
    pub ping_attempts: u32,
    pub wake_interval: Duration,
    pub connect_retry_limit: u32,
    pub connect_retry_interval: Duration,
    pub power_poll: Duration,
    pub stats_poll: Duration,
    pub grace_period: Duration,
    pub countdown_poll: Duration,
    pub shutdown_settle: Duration,
}

impl TryFrom<&TimingSettings> for Timings {
    type Error = ConfigError;

    fn try_from(t: &TimingSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            ping_attempts: t.ping_attempts,
            wake_interval: seconds("wake_interval", t.wake_interval)?,
            connect_retry_limit: t.connect_retry_limit,
            connect_retry_interval: seconds("connect_retry_interval", t.connect_retry_interval)?,
            power_poll: seconds("power_poll_interval", t.power_poll_interval)?,
            stats_poll: seconds("stats_poll_interval", t.stats_poll_interval)?,
            grace_period: seconds("grace_period", t.grace_period)?,
            countdown_poll: seconds("countdown_poll_interval", t.countdown_poll_interval)?,
            shutdown_settle: seconds("shutdown_settle", t.shutdown_settle)?,
        })
    }
}

/// Identity of the remote machine. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedTarget {
    pub host: String,
    pub address: IpAddr,
    pub mac: MacAddress,
    pub timings: Timings,
}

impl SupervisedTarget {
    /// Assemble a target from validated config and an already resolved address.
    pub fn from_config(config: &AgentConfig, address: IpAddr) -> anyhow::Result<Self> {
        Ok(Self {
            host: config.target.host.clone(),
            address,
            mac: config.target.mac_address.parse()?,
            timings: Timings::try_from(&config.timing)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AgentConfig {
        let mut config = AgentConfig::default();
        config.target.host = "nas".to_string();
        config.target.mac_address = "aa:bb:cc:dd:ee:ff".to_string();
        config
    }

    #[test]
    fn builds_timings_from_seconds() {
        let target = SupervisedTarget::from_config(&config(), "10.0.0.2".parse().unwrap()).unwrap();
        assert_eq!(target.timings.grace_period, Duration::from_secs(240));
        assert_eq!(target.timings.countdown_poll, Duration::from_secs(1));
        assert_eq!(target.mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn oversized_interval_is_an_error_not_a_panic() {
        let mut config = config();
        config.timing.shutdown_settle = 1e20;
        let err = Timings::try_from(&config.timing).unwrap_err();
        assert_eq!(err, ConfigError::OutOfRange { field: "shutdown_settle", value: 1e20 });
        assert!(SupervisedTarget::from_config(&config, "10.0.0.2".parse().unwrap()).is_err());
    }
}
