//! Running the agent outside a terminal: pid file, detached child, systemd unit.

pub mod control;
pub mod pid;
pub mod systemd;

pub const SERVICE_NAME: &str = "blackout-agent";
pub const RUN_DIR: &str = "/run/blackout-agent";
pub const PID_FILE: &str = "/run/blackout-agent/blackout-agent.pid";
pub const LOG_DIR: &str = "/var/log/blackout-agent";
pub const SYSTEMD_SERVICE_PATH: &str = "/etc/systemd/system/blackout-agent.service";

// systemd supervises the foreground process directly, so no PIDFile.
// TimeoutStopSec must cover a shutdown command that is already in flight.
pub const SYSTEMD_SERVICE_TEMPLATE: &str = r#"[Unit]
Description=Blackout Agent (power-outage watchdog)
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={{EXEC_PATH}} --foreground --config-file {{CONFIG_PATH}}
ExecReload=/bin/kill -HUP $MAINPID
RuntimeDirectory=blackout-agent
TimeoutStopSec={{STOP_TIMEOUT}}
Restart=on-failure
RestartSec=10
User=root

[Install]
WantedBy=multi-user.target
"#;
