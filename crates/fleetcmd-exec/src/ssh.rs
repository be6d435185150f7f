//! SSH command execution using russh crate

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::keys::PrivateKeyWithHashAlg;
use russh::keys::ssh_key::{self, HashAlg, PrivateKey};
use russh::{ChannelMsg, Disconnect, client};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument};

use crate::error::ExecError;
use crate::result::{CommandOutput, ConnectionInfo};
use crate::traits::{Connector, RemoteSession};

/// Default time allowed for TCP connect plus authentication
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH client handler for russh
#[derive(Debug)]
struct SshClientHandler {
    host: String,
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Accept all server keys (like StrictHostKeyChecking=no), but leave a trace
        info!(
            host = %self.host,
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting server host key"
        );
        Ok(true)
    }
}

/// Opens SSH sessions authenticated with one shared private key
#[derive(Clone)]
pub struct SshConnector {
    key: Arc<PrivateKey>,
    connect_timeout: Duration,
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnector")
            .field("key_algorithm", &self.key.algorithm())
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl SshConnector {
    /// Create a connector around an already resolved key
    #[must_use]
    pub fn new(key: PrivateKey) -> Self {
        Self {
            key: Arc::new(key),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set the connect + authenticate timeout
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[instrument(skip(self), fields(host = %target.host))]
    async fn connect(
        &self,
        target: &ConnectionInfo,
    ) -> Result<client::Handle<SshClientHandler>, ExecError> {
        info!(
            host = %target.host,
            port = target.port,
            user = %target.user,
            "connecting to SSH"
        );

        let config = Arc::new(client::Config::default());
        let handler = SshClientHandler {
            host: target.host.clone(),
        };

        let mut session = client::connect(config, (&target.host[..], target.port), handler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth_res = session
            .authenticate_publickey(
                &target.user,
                PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;

        if !auth_res.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key authentication failed".to_string(),
            ));
        }

        info!(host = %target.host, "SSH connected and authenticated");
        Ok(session)
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, target: &ConnectionInfo) -> Result<Box<dyn RemoteSession>, ExecError> {
        let handle = match timeout(self.connect_timeout, self.connect(target)).await {
            Ok(result) => result?,
            Err(_) => {
                error!(
                    host = %target.host,
                    timeout = ?self.connect_timeout,
                    "SSH connect timed out"
                );
                return Err(ExecError::Timeout {
                    timeout: self.connect_timeout,
                });
            }
        };

        Ok(Box::new(SshSession {
            conn_info: target.clone(),
            session: Mutex::new(Some(handle)),
        }))
    }
}

/// An authenticated SSH session
///
/// Each command runs on its own channel of the shared connection.
pub struct SshSession {
    conn_info: ConnectionInfo,
    session: Mutex<Option<client::Handle<SshClientHandler>>>,
}

impl std::fmt::Debug for SshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshSession")
            .field("conn_info", &self.conn_info)
            .finish_non_exhaustive()
    }
}

impl SshSession {
    /// Execute command on remote host
    #[instrument(skip(self, cmd), fields(host = %self.conn_info.host))]
    async fn execute_remote(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        let mut session_lock = self.session.lock().await;
        let session = session_lock.as_mut().ok_or(ExecError::NotConnected)?;

        let start = Instant::now();

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::IoError(e.to_string()))?;

        let mut status = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        // exit-status may arrive after EOF, so drain until the channel closes
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    status = Some(exit_status.cast_signed());
                }
                _ => {}
            }
        }

        let duration = start.elapsed();

        debug!(status = ?status, duration = ?duration, "remote command completed");

        Ok(CommandOutput {
            status,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration,
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, cmd: &str) -> Result<CommandOutput, ExecError> {
        self.execute_remote(cmd).await
    }

    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout_duration: Duration,
    ) -> Result<CommandOutput, ExecError> {
        let start = Instant::now();

        match timeout(timeout_duration, self.execute_remote(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    host = %self.conn_info.host,
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
        let mut session_lock = self.session.lock().await;

        if let Some(session) = session_lock.take() {
            session
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
                .map_err(|e| ExecError::IoError(e.to_string()))?;
            info!(host = %self.conn_info.host, "SSH disconnected");
        }
        Ok(())
    }

    fn session_type(&self) -> &'static str {
        "ssh"
    }
}

