//! Shutdown scheduler: watches the local power source and escalates to a
//! remote shutdown once an outage outlasts the grace period.
//!
//! ```text
//! Monitoring --(not mains)--> Countdown --(deadline passed)--> ShuttingDown --> Completed
//!     ^                           |
//!     +-------(mains again)-------+
//! ```
//!
//! `Monitoring` polls at the normal cadence and doubles as the channel
//! keepalive. `Countdown` polls at the faster cadence so an abort lands as
//! close to the return of mains power as possible.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SupervisionError;
use crate::power::PowerSource;
use crate::remote::RemoteHandle;
use crate::supervisor::{pause, SupervisionContext};

/// Alive only while the host is off mains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownCountdown {
    pub started: Instant,
    pub deadline: Instant,
    pub deadline_at: DateTime<Utc>,
}

impl ShutdownCountdown {
    pub fn start(grace: Duration) -> Self {
        let started = Instant::now();
        let grace_chrono = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            started,
            deadline: started + grace,
            deadline_at: Utc::now() + grace_chrono,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() > self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Monitoring,
    Countdown(ShutdownCountdown),
    ShuttingDown,
}

/// How a cycle ended when it ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleEnd {
    /// The shutdown command went out; the caller closes the handle and lets the remote settle.
    ShutdownIssued,
}

pub async fn run(
    ctx: &SupervisionContext,
    handle: &RemoteHandle,
    token: &CancellationToken,
) -> Result<CycleEnd, SupervisionError> {
    let timings = &ctx.target.timings;
    let mut state = State::Monitoring;

    loop {
        state = match state {
            State::Monitoring => match ctx.collab.power.current_source().await? {
                PowerSource::Mains => {
                    debug!("Checking battery: on mains");
                    pause(token, timings.power_poll).await?;
                    handle.check_alive().await?;
                    State::Monitoring
                }
                PowerSource::Other => {
                    let countdown = ShutdownCountdown::start(timings.grace_period);
                    ctx.status.schedule_shutdown(countdown.deadline_at);
                    error!(
                        "Power outage detected. {} will be shut down at {} unless power returns",
                        handle.host(),
                        countdown.deadline_at.with_timezone(&chrono::Local).format("%H:%M:%S")
                    );
                    State::Countdown(countdown)
                }
            },
            State::Countdown(countdown) => match ctx.collab.power.current_source().await? {
                PowerSource::Mains => {
                    ctx.status.clear_shutdown();
                    info!(
                        "Back on mains power after {:?}, aborting shutdown!",
                        countdown.started.elapsed()
                    );
                    State::Monitoring
                }
                PowerSource::Other if countdown.expired() => State::ShuttingDown,
                PowerSource::Other => {
                    debug!("Still on battery, {:?} left", countdown.remaining());
                    pause(token, timings.countdown_poll).await?;
                    State::Countdown(countdown)
                }
            },
            State::ShuttingDown => {
                error!("!!!!!!!!!! SHUTDOWN ISSUED !!!!!!!!!!");
                // once issued the command runs to completion, termination or not
                let output = handle.run(&ctx.commands.shutdown).await.map_err(|e| {
                    warn!("Shutdown command failed, state of {} unknown: {}", handle.host(), e);
                    e
                })?;
                if !output.is_empty() {
                    debug!("Shutdown command output: {}", output);
                }
                ctx.status.clear_shutdown();
                return Ok(CycleEnd::ShutdownIssued);
            }
        };
    }
}
