//! Command-line argument definitions (clap) and help text.

use std::path::PathBuf;

use clap::Parser;

pub const HELP_TEXT: &str = "
Blackout Agent - keeps a remote machine alive and shuts it down cleanly on power loss
Usage: blackout-agent [OPTIONS]

Options:
  -h, --help                    Print help
  -V, --version                 Print version
Run:
  -f, --foreground              Run supervision in the foreground
  -s, --start                   Start the agent daemon in background
  -x, --stop                    Stop the agent daemon
Service:
  -I, --install-service         Install systemd service for auto-start on boot
  -U, --uninstall-service       Uninstall systemd service
Config & Debug:
  -c, --config                  Show current configuration
      --init-config             Write a default configuration file
      --config-file <PATH>      Use this configuration file instead of ./config.json
      --check                   Resolve the target, read the power source and probe once
      --log-level <LOG_LEVEL>   Set log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
";

#[derive(Parser, Debug)]
#[command(name = "blackout-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Power-outage watchdog for a remote machine", long_about = None)]
pub struct Args {
    // === Run ===
    /// Run supervision in the foreground
    #[arg(short = 'f', long, help_heading = "Run")]
    pub foreground: bool,

    /// Start the agent daemon in background
    #[arg(short = 's', long, help_heading = "Run")]
    pub start: bool,

    /// Stop the agent daemon
    #[arg(short = 'x', long, help_heading = "Run")]
    pub stop: bool,

    // === Service ===
    /// Install systemd service for auto-start on boot
    #[arg(short = 'I', long = "install-service", help_heading = "Service")]
    pub install_service: bool,

    /// Uninstall systemd service
    #[arg(short = 'U', long = "uninstall-service", help_heading = "Service")]
    pub uninstall_service: bool,

    // === Config & Debug ===
    /// Show current configuration
    #[arg(short = 'c', long, help_heading = "Config & Debug")]
    pub config: bool,

    /// Write a default configuration file
    #[arg(long = "init-config", help_heading = "Config & Debug")]
    pub init_config: bool,

    /// Use this configuration file instead of ./config.json
    #[arg(long = "config-file", value_name = "PATH", help_heading = "Config & Debug")]
    pub config_file: Option<PathBuf>,

    /// Resolve the target, read the power source and probe once
    #[arg(long, help_heading = "Config & Debug")]
    pub check: bool,

    /// Set log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
    #[arg(long = "log-level", help_heading = "Config & Debug")]
    pub log_level: Option<String>,

    /// Internal flag for daemon child process (do not use directly)
    #[arg(long, hide = true)]
    pub daemon_child: bool,
}

impl Args {
    /// Modes that need the async supervision setup (logging, config).
    pub fn runs_agent(&self) -> bool {
        self.foreground || self.daemon_child || self.check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_foreground_with_overrides() {
        let args = Args::try_parse_from([
            "blackout-agent",
            "-f",
            "--config-file",
            "/etc/blackout/config.json",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(args.foreground);
        assert!(args.runs_agent());
        assert_eq!(args.config_file, Some(PathBuf::from("/etc/blackout/config.json")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn management_commands_do_not_run_the_agent() {
        let args = Args::try_parse_from(["blackout-agent", "--stop"]).unwrap();
        assert!(args.stop);
        assert!(!args.runs_agent());
    }

    #[test]
    fn daemon_child_flag_is_accepted_but_hidden() {
        let args = Args::try_parse_from(["blackout-agent", "--daemon-child"]).unwrap();
        assert!(args.daemon_child);
        assert!(!HELP_TEXT.contains("daemon-child"));
    }
}
