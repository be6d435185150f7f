//! Session and connector traits

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::{CommandOutput, ConnectionInfo};

/// An open, authenticated session to one host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a shell command and capture its output
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError>;

    /// Run a shell command, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ExecError>;

    /// Release the session. Calling it twice is a no-op.
    async fn close(&self) -> Result<(), ExecError>;

    /// Short name of the transport, for logs
    fn session_type(&self) -> &'static str;
}

/// Opens sessions with a shared key credential
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open and authenticate a session to `target`
    async fn open(&self, target: &ConnectionInfo) -> Result<Box<dyn RemoteSession>, ExecError>;
}
