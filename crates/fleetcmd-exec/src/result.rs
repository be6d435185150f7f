//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Captured output of one command run over a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit status, absent when the remote side never reported one
    pub status: Option<i32>,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandOutput {
    /// Check if command exited with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Where and as whom to open a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Host address
    pub host: String,
    /// Port (default 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login user
    pub user: String,
}

fn default_port() -> u16 {
    22
}

impl ConnectionInfo {
    /// Create new connection info on the default SSH port
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            user: user.into(),
        }
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Whether the host names the local machine
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "::1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_zero_status() {
        let mut output = CommandOutput {
            status: Some(0),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::ZERO,
        };
        assert!(output.success());

        output.status = None;
        assert!(!output.success());

        output.status = Some(2);
        assert!(!output.success());
    }

    #[test]
    fn test_connection_info_defaults() {
        let info = ConnectionInfo::new("10.0.0.5", "admin");
        assert_eq!(info.port, 22);
        assert!(!info.is_local());
        assert_eq!(info.with_port(2222).port, 2222);
        assert!(ConnectionInfo::new("localhost", "root").is_local());
    }
}
