//! Published supervision status and the in-process reporter that reads it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Snapshot of what the supervisor is doing right now.
///
/// The scheduled flag is derived from `shutdown_at`, so the pair can never disagree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SupervisorStatus {
    pub connected: bool,
    pub shutdown_at: Option<DateTime<Utc>>,
    pub last_stats: Option<serde_json::Value>,
}

impl SupervisorStatus {
    pub fn shutdown_scheduled(&self) -> bool {
        self.shutdown_at.is_some()
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            connected: self.connected,
            shutdown_scheduled: self.shutdown_scheduled(),
            shutdown_at_epoch: self.shutdown_at.map(|at| at.timestamp()),
            last_stats: self.last_stats.clone(),
        }
    }
}

/// Wire shape of the status for readers that want JSON.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub connected: bool,
    #[serde(rename = "shutdownScheduled")]
    pub shutdown_scheduled: bool,
    #[serde(rename = "shutdownAtEpoch", skip_serializing_if = "Option::is_none")]
    pub shutdown_at_epoch: Option<i64>,
    #[serde(rename = "lastStats", skip_serializing_if = "Option::is_none")]
    pub last_stats: Option<serde_json::Value>,
}

/// Writer side of the published status. Cheap to clone into each loop.
#[derive(Clone)]
pub struct StatusHandle {
    tx: watch::Sender<SupervisorStatus>,
}

impl StatusHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SupervisorStatus::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> SupervisorStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorStatus> {
        self.tx.subscribe()
    }

    pub fn set_connected(&self, connected: bool) {
        self.tx.send_if_modified(|s| {
            let changed = s.connected != connected;
            s.connected = connected;
            changed
        });
    }

    pub fn schedule_shutdown(&self, at: DateTime<Utc>) {
        self.tx.send_modify(|s| s.shutdown_at = Some(at));
    }

    pub fn clear_shutdown(&self) {
        self.tx.send_if_modified(|s| s.shutdown_at.take().is_some());
    }

    pub fn set_stats(&self, stats: serde_json::Value) {
        self.tx.send_modify(|s| s.last_stats = Some(stats));
    }

    /// Drops the connection flag and any countdown in a single update.
    pub fn end_cycle(&self) {
        self.tx.send_if_modified(|s| {
            let changed = s.connected || s.shutdown_at.is_some();
            s.connected = false;
            s.shutdown_at = None;
            changed
        });
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Log one line per status change until cancelled.
pub fn spawn_status_reporter(
    mut rx: watch::Receiver<SupervisorStatus>,
    token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = rx.borrow_and_update().clone();
                    let countdown = match status.shutdown_at {
                        Some(at) => format!("shutdown at {}", at.with_timezone(&chrono::Local).format("%H:%M:%S")),
                        None => "no shutdown scheduled".to_string(),
                    };
                    info!(
                        "Status: {} | {} | stats {}",
                        if status.connected { "connected" } else { "disconnected" },
                        countdown,
                        if status.last_stats.is_some() { "available" } else { "pending" },
                    );
                    if let Ok(json) = serde_json::to_string(&status.report()) {
                        debug!("Status report: {}", json);
                    }
                }
            }
        }
    })
}
