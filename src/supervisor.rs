//! Top-level supervision loop: connect, watch power, shut down, repeat.

pub mod connection;
pub mod shutdown;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::SupervisionError;
use crate::power::PowerMonitor;
use crate::probe::Prober;
use crate::remote::RemoteTransport;
use crate::status::StatusHandle;
use crate::target::SupervisedTarget;
use crate::wol::WakeTrigger;

use shutdown::CycleEnd;
use telemetry::TelemetryPoller;

/// External capabilities the loops drive.
#[derive(Clone)]
pub struct Collaborators {
    pub prober: Arc<dyn Prober>,
    pub waker: Arc<dyn WakeTrigger>,
    pub power: Arc<dyn PowerMonitor>,
    pub transport: Arc<dyn RemoteTransport>,
}

#[derive(Debug, Clone)]
pub struct RemoteCommands {
    pub shutdown: String,
    /// `None` disables the telemetry poller.
    pub stats: Option<String>,
}

pub struct SupervisionContext {
    pub target: SupervisedTarget,
    pub collab: Collaborators,
    pub commands: RemoteCommands,
    pub status: StatusHandle,
}

/// Sleep unless the operator asks us to stop first.
pub(crate) async fn pause(token: &CancellationToken, duration: Duration) -> Result<(), SupervisionError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SupervisionError::Terminated),
        _ = time::sleep(duration) => Ok(()),
    }
}

/// Race `fut` against termination. A dropped future must leave nothing behind.
pub(crate) async fn cancellable<F: Future>(token: &CancellationToken, fut: F) -> Result<F::Output, SupervisionError> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SupervisionError::Terminated),
        out = fut => Ok(out),
    }
}

pub struct Supervisor {
    ctx: SupervisionContext,
}

impl Supervisor {
    pub fn new(ctx: SupervisionContext) -> Self {
        Self { ctx }
    }

    pub fn status(&self) -> &StatusHandle {
        &self.ctx.status
    }

    /// Runs until `token` is cancelled (`Ok`) or an unexpected fault occurs (`Err`).
    pub async fn run(&self, token: CancellationToken) -> Result<()> {
        info!("#################### Session Start ####################");
        let mut cycle: u64 = 0;

        loop {
            cycle += 1;
            match self.run_cycle(&token).await {
                Ok(()) => {
                    info!("Cycle {} completed, waiting for {} to come back", cycle, self.ctx.target.host);
                }
                Err(e @ (SupervisionError::Connection(_) | SupervisionError::Command(_))) => {
                    warn!("Cycle {} lost the control channel: {}. Restarting supervision", cycle, e);
                }
                Err(SupervisionError::Terminated) => {
                    info!("Termination requested, supervisor stopped");
                    return Ok(());
                }
                Err(SupervisionError::Fault(e)) => {
                    error!("Supervision halted by unexpected fault: {:#}", e);
                    return Err(e);
                }
            }
        }
    }

    async fn run_cycle(&self, token: &CancellationToken) -> Result<(), SupervisionError> {
        let ctx = &self.ctx;
        let handle = Arc::new(connection::establish(ctx, token).await?);

        let telemetry = ctx.commands.stats.as_ref().map(|command| {
            TelemetryPoller::spawn(
                Arc::clone(&handle),
                command.clone(),
                ctx.target.timings.stats_poll,
                ctx.status.clone(),
                token,
            )
        });

        info!("Entering power loop...");
        let outcome = shutdown::run(ctx, &handle, token).await;
        info!("Power loop exit...");

        // poller must be gone before the handle is
        if let Some(poller) = telemetry {
            poller.stop().await;
        }
        handle.close().await;
        ctx.status.end_cycle();

        match outcome? {
            CycleEnd::ShutdownIssued => {
                info!("Giving {} {:?} to power off", ctx.target.host, ctx.target.timings.shutdown_settle);
                pause(token, ctx.target.timings.shutdown_settle).await
            }
        }
    }
}
