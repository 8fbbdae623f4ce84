//! Blackout agent entry point: CLI dispatch, signal handlers, async runtime.

mod app;
mod config;
mod daemon;
mod error;
mod power;
mod probe;
mod remote;
mod status;
mod supervisor;
mod target;
mod wol;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use app::check::run_check;
use app::cli::{Args, HELP_TEXT};
use app::logging::{filter_for, init_tracing, reload_level};
use config::persistence::{load_config, resolve_config_path, save_config};
use config::resolve::{default_ssh_config, resolve_address};
use config::types::{seconds, AgentConfig};
use daemon::control::{start_daemon, stop_daemon};
use daemon::pid::{release_own_pid, save_pid};
use daemon::systemd::{install_systemd_service, uninstall_systemd_service};
use power::SysfsPowerMonitor;
use probe::PingProber;
use remote::SshTransport;
use status::{spawn_status_reporter, StatusHandle};
use supervisor::{Collaborators, RemoteCommands, SupervisionContext, Supervisor};
use target::SupervisedTarget;
use wol::UdpWakeTrigger;

#[tokio::main]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{}", HELP_TEXT);
                std::process::exit(0);
            }
            if err.kind() == clap::error::ErrorKind::DisplayVersion {
                println!("\x1b[32mblackout-agent {} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
                std::process::exit(0);
            }

            eprintln!("{}", err);
            eprintln!();
            print!("{}", HELP_TEXT);
            eprintln!("\nFor more information, try '--help'.");
            std::process::exit(1);
        }
    };

    // Management commands (before async setup)
    if args.start {
        return start_daemon(args.config_file.as_deref(), args.log_level.as_deref()).await;
    }

    if args.stop {
        return stop_daemon();
    }

    if args.install_service {
        return install_systemd_service(args.config_file.as_deref()).await;
    }

    if args.uninstall_service {
        return uninstall_systemd_service();
    }

    if args.init_config {
        return init_config(args.config_file.as_deref()).await;
    }

    if args.config {
        let config = load_config(args.config_file.as_deref()).await?;
        println!("\n{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if args.check {
        let ok = run_check(args.config_file.as_deref()).await?;
        std::process::exit(if ok { 0 } else { 1 });
    }

    if !args.runs_agent() {
        eprintln!("ERROR: No command specified. You must specify a command.");
        eprintln!();
        let _ = Args::command().print_help();
        eprintln!();
        eprintln!("Common commands:");
        eprintln!("  ./blackout-agent --init-config   Write a default config.json");
        eprintln!("  ./blackout-agent --check         Verify target and power source");
        eprintln!("  ./blackout-agent --start         Start the agent");
        eprintln!("  ./blackout-agent --stop          Stop the agent");
        std::process::exit(1);
    }

    // Priority: 1. --log-level flag, 2. LOG_LEVEL env, 3. config file, 4. default (info)
    let explicit_level = args
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok());
    let filter = match explicit_level.as_deref() {
        Some(level) => filter_for(level).unwrap_or_else(|| {
            eprintln!("Invalid log level '{}'. Using INFO. Valid levels: TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL", level);
            "info"
        }),
        None => "info",
    };
    // colors only on a terminal, not in the daemon log file or the journal
    init_tracing(filter, !args.daemon_child && std::io::stdout().is_terminal());

    if args.daemon_child {
        save_pid(std::process::id())?;
    }

    let config_path = resolve_config_path(args.config_file.as_deref())?;
    let result = run_agent(&config_path, explicit_level.is_none()).await;

    if args.daemon_child {
        release_own_pid();
    }

    match result {
        Ok(()) => {
            info!("Agent shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Agent stopped: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn init_config(path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(path)?;
    if path.exists() {
        eprintln!("ERROR: {:?} already exists, not overwriting", path);
        std::process::exit(1);
    }
    save_config(&AgentConfig::default(), &path).await?;
    println!("✓ Default configuration written to {:?}", path);
    println!("  Set target.host and target.mac_address, then run --check");
    Ok(())
}

async fn run_agent(config_path: &Path, level_from_config: bool) -> Result<()> {
    info!("Blackout Agent v{} starting ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS);

    let config = load_config(Some(config_path)).await?;
    if level_from_config {
        if let Err(e) = reload_level(&config.agent.log_level) {
            warn!("Keeping INFO log level: {:#}", e);
        }
    }
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {:?}", config_path))?;

    let ssh_config = default_ssh_config();
    let address = resolve_address(&config.target, ssh_config.as_deref())
        .await
        .with_context(|| format!("Cannot resolve target '{}'", config.target.host))?;
    let target = SupervisedTarget::from_config(&config, address)?;
    info!("Supervising {} at {} (MAC {})", target.host, target.address, target.mac);

    let collab = Collaborators {
        prober: Arc::new(PingProber),
        waker: Arc::new(UdpWakeTrigger::new(&config.target.broadcast_address, config.target.wake_port)),
        power: Arc::new(SysfsPowerMonitor::new(&config.power.supply_path)),
        transport: Arc::new(SshTransport::new(
            &config.remote.control_dir,
            seconds("connect_timeout", config.timing.connect_timeout)?,
            seconds("command_timeout", config.timing.command_timeout)?,
        )),
    };
    let commands = RemoteCommands {
        shutdown: config.remote.shutdown_command.clone(),
        stats: config.remote.telemetry_enabled.then(|| config.remote.stats_command.clone()),
    };

    let supervisor = Supervisor::new(SupervisionContext {
        target,
        collab,
        commands,
        status: StatusHandle::new(),
    });
    let token = CancellationToken::new();
    let reporter = spawn_status_reporter(supervisor.status().subscribe(), token.clone());
    install_signal_handlers(token.clone(), config_path.to_path_buf())?;

    let result = supervisor.run(token.clone()).await;

    token.cancel();
    let _ = reporter.await;
    result
}

/// SIGINT/SIGTERM cancel `token`. SIGHUP re-reads the log level from the config file.
fn install_signal_handlers(token: CancellationToken, config_path: PathBuf) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to setup SIGHUP handler")?;

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown signal received (Ctrl+C)"),
            _ = sigterm.recv() => info!("Shutdown signal received (SIGTERM)"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                received = sighup.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
            }
            info!("SIGHUP received, reloading log level configuration");
            match load_config(Some(&config_path)).await {
                Ok(config) => match reload_level(&config.agent.log_level) {
                    Ok(()) => info!("Log level reloaded: {}", config.agent.log_level.to_uppercase()),
                    Err(e) => error!("Failed to reload log level: {:#}", e),
                },
                Err(e) => error!("Failed to reload config: {:#}", e),
            }
        }
    });

    Ok(())
}
