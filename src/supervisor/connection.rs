//! Connection supervisor: wait for the remote to answer, wake it when mains
//! power allows, then open the control channel with a bounded retry batch.

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::SupervisionError;
use crate::power::PowerSource;
use crate::remote::RemoteHandle;
use crate::supervisor::{cancellable, pause, SupervisionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitReachable,
    Connect,
    Backoff,
}

/// Returns only with a live handle, or on termination / fault.
pub async fn establish(ctx: &SupervisionContext, token: &CancellationToken) -> Result<RemoteHandle, SupervisionError> {
    let target = &ctx.target;
    let timings = &target.timings;
    let mut phase = Phase::AwaitReachable;

    info!("Waiting for connection to {} ({})...", target.host, target.address);

    loop {
        phase = match phase {
            Phase::AwaitReachable => {
                let alive = cancellable(token, ctx.collab.prober.probe(target.address, timings.ping_attempts)).await?;
                if alive {
                    info!("{} is alive!", target.host);
                    Phase::Connect
                } else {
                    match ctx.collab.power.current_source().await? {
                        PowerSource::Mains => {
                            info!("Detected mains power but {} is still not alive...", target.host);
                            ctx.collab.waker.wake(target.mac).await;
                            info!("Waiting for boot...");
                        }
                        PowerSource::Other => {
                            // never wake a machine we may be about to power off
                            info!("Power outage detected, not waking {}. Waiting for power...", target.host);
                        }
                    }
                    pause(token, timings.wake_interval).await?;
                    Phase::AwaitReachable
                }
            }
            Phase::Connect => match connect_batch(ctx, token).await? {
                Some(handle) => {
                    ctx.status.set_connected(true);
                    info!("********** Connection Established **********");
                    return Ok(handle);
                }
                None => {
                    ctx.status.set_connected(false);
                    warn!(
                        "Gave up connecting to {} after {} attempts, retrying in {:?}",
                        target.host, timings.connect_retry_limit, timings.connect_retry_interval
                    );
                    Phase::Backoff
                }
            },
            Phase::Backoff => {
                pause(token, timings.connect_retry_interval).await?;
                Phase::AwaitReachable
            }
        };
    }
}

/// Up to `connect_retry_limit` back-to-back attempts. `None` when all failed.
async fn connect_batch(
    ctx: &SupervisionContext,
    token: &CancellationToken,
) -> Result<Option<RemoteHandle>, SupervisionError> {
    let limit = ctx.target.timings.connect_retry_limit;

    for attempt in 1..=limit {
        match cancellable(token, ctx.collab.transport.connect(&ctx.target)).await? {
            Ok(session) => return Ok(Some(RemoteHandle::new(ctx.target.host.clone(), session))),
            Err(e) => error!("Connection attempt {}/{} failed: {}", attempt, limit, e),
        }
    }
    Ok(None)
}
