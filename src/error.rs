//! Error taxonomy shared by the supervision loops.

use std::time::Duration;

use thiserror::Error;

/// Failure to open (or keep open) the control channel to the remote machine.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("control channel to {host} not ready after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("control channel to {host} refused: {reason}")]
    Refused { host: String, reason: String },

    #[error("control channel to {host} dropped")]
    Dropped { host: String },

    #[error("failed to spawn transport: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A remote command that could not be executed or produced unusable output.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("remote handle is closed")]
    Closed,

    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("channel failure while running '{command}': {stderr}")]
    Channel { command: String, stderr: String },

    #[error("command '{command}' exited with status {code}: {stderr}")]
    Failed { command: String, code: i32, stderr: String },

    #[error("malformed output from '{command}': {source}")]
    Malformed {
        command: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Everything that can end a supervision cycle.
///
/// `Connection` and `Command` restart the cycle, `Terminated` exits cleanly,
/// `Fault` is a defect and takes the process down.
#[derive(Debug, Error)]
pub enum SupervisionError {
    #[error(transparent)]
    Connection(#[from] ConnectError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("operator requested termination")]
    Terminated,

    #[error("unexpected fault: {0:#}")]
    Fault(anyhow::Error),
}

impl From<anyhow::Error> for SupervisionError {
    fn from(e: anyhow::Error) -> Self {
        Self::Fault(e)
    }
}
