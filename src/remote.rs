//! Control channel to the remote machine: transport seam and the owned handle.

pub mod ssh;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{CommandError, ConnectError};
use crate::target::SupervisedTarget;

pub use ssh::SshTransport;

/// Opens control channels. How commands travel is up to the implementation.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn connect(&self, target: &SupervisedTarget) -> Result<Box<dyn RemoteSession>, ConnectError>;
}

/// A live control channel.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run `command` remotely and return its trimmed stdout.
    async fn run(&self, command: &str) -> Result<String, CommandError>;

    /// Keepalive check of the channel itself.
    async fn is_alive(&self) -> bool;

    async fn close(&mut self);
}

/// The one live channel for a supervision cycle.
///
/// Shared between the scheduler and the telemetry poller. Once closed it
/// refuses every command; a new cycle must open a new handle.
pub struct RemoteHandle {
    host: String,
    session: RwLock<Option<Box<dyn RemoteSession>>>,
}

impl RemoteHandle {
    pub fn new(host: impl Into<String>, session: Box<dyn RemoteSession>) -> Self {
        Self {
            host: host.into(),
            session: RwLock::new(Some(session)),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn run(&self, command: &str) -> Result<String, CommandError> {
        let guard = self.session.read().await;
        match guard.as_ref() {
            Some(session) => {
                debug!("Executing on {}: '{}'", self.host, command);
                session.run(command).await
            }
            None => Err(CommandError::Closed),
        }
    }

    pub async fn check_alive(&self) -> Result<(), ConnectError> {
        let guard = self.session.read().await;
        match guard.as_ref() {
            Some(session) if session.is_alive().await => Ok(()),
            _ => Err(ConnectError::Dropped { host: self.host.clone() }),
        }
    }

    /// Idempotent. Waits for in-flight commands before tearing the channel down.
    pub async fn close(&self) {
        let taken = self.session.write().await.take();
        if let Some(mut session) = taken {
            debug!("Closing control channel to {}", self.host);
            session.close().await;
        }
    }

    #[cfg(test)]
    pub async fn is_closed(&self) -> bool {
        self.session.read().await.is_none()
    }
}
