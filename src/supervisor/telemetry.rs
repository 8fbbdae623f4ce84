//! Best-effort stats poller. Runs beside the shutdown scheduler and never
//! reports failure to it; its only output is `last_stats` in the status.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::error::CommandError;
use crate::remote::RemoteHandle;
use crate::status::StatusHandle;

pub struct TelemetryPoller {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TelemetryPoller {
    /// The poller stops on its own when `parent` is cancelled.
    pub fn spawn(
        handle: Arc<RemoteHandle>,
        command: String,
        every: Duration,
        status: StatusHandle,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let task = tokio::spawn(poll_loop(handle, command, every, status, token.clone()));
        Self { token, task }
    }

    /// Cancel and join. An in-flight fetch is abandoned and its result dropped.
    pub async fn stop(self) {
        self.token.cancel();
        match self.task.await {
            Ok(()) => debug!("Telemetry poller stopped"),
            Err(e) if e.is_cancelled() => debug!("Telemetry poller cancelled"),
            Err(e) => error!("Telemetry poller crashed: {}", e),
        }
    }
}

async fn poll_loop(
    handle: Arc<RemoteHandle>,
    command: String,
    every: Duration,
    status: StatusHandle,
    token: CancellationToken,
) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = fetch_stats(&handle, &command) => result,
        };

        match result {
            Ok(stats) => {
                status.set_stats(stats);
                polls += 1;
                if polls % 30 == 0 {
                    debug!("Stats polls: {} completed", polls);
                }
            }
            Err(e) => trace!("Stats poll skipped: {}", e),
        }
    }
}

/// Run the stats command and parse its stdout as JSON.
pub async fn fetch_stats(handle: &RemoteHandle, command: &str) -> Result<serde_json::Value, CommandError> {
    let output = handle.run(command).await?;
    serde_json::from_str(&output).map_err(|source| CommandError::Malformed {
        command: command.to_string(),
        source,
    })
}
