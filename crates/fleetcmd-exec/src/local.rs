//! Local command execution using `tokio::process`

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::ExecError;
use crate::result::CommandOutput;
use crate::traits::RemoteSession;

/// Session on the local machine
///
/// Commands run through `sh -c`, so pipes and redirections behave as they do over SSH.
#[derive(Debug, Default)]
pub struct LocalSession {
    closed: AtomicBool,
}

impl LocalSession {
    /// Create a new local session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, cmd), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExecError::NotConnected);
        }

        let start = Instant::now();

        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::SpawnError(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let duration = start.elapsed();
        let status = output.status.code();

        debug!(status = ?status, duration = ?duration, "local command completed");

        Ok(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration,
        })
    }
}

#[async_trait]
impl RemoteSession for LocalSession {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        self.execute(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.execute(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    timeout = ?timeout_duration,
                    elapsed = ?start.elapsed(),
                    "command timed out"
                );
                Err(ExecError::Timeout {
                    timeout: timeout_duration,
                })
            }
        }
    }

    async fn close(&self) -> Result<(), ExecError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn session_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_success() {
        let session = LocalSession::new();
        let result = session.run("echo hello").await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_failure() {
        let session = LocalSession::new();
        let result = session.run("exit 42").await.unwrap();

        assert!(!result.success());
        assert_eq!(result.status, Some(42));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let session = LocalSession::new();
        let result = session
            .run_with_timeout("sleep 5", Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(ExecError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_run_with_stderr() {
        let session = LocalSession::new();
        let result = session.run("echo error >&2").await.unwrap();

        assert!(result.success());
        assert_eq!(result.stderr.trim(), "error");
    }

    #[tokio::test]
    async fn test_pipe_reaches_stdin() {
        let session = LocalSession::new();
        let result = session
            .run("printf '%s\\n' 'secret' | cat")
            .await
            .unwrap();

        assert_eq!(result.stdout, "secret\n");
    }

    #[tokio::test]
    async fn test_run_after_close() {
        let session = LocalSession::new();
        session.close().await.unwrap();
        session.close().await.unwrap();

        assert!(matches!(
            session.run("true").await,
            Err(ExecError::NotConnected)
        ));
    }
}
