//! Session factory choosing between local execution and SSH

use async_trait::async_trait;
use eyre::{Result, WrapErr};
use fleetcmd_core::Inventory;
use fleetcmd_exec::{
    ConnectionInfo, Connector, ExecError, LocalSession, RemoteSession, SshConnector,
};
use nix::unistd::{Uid, User};

use crate::config::Config;

/// Default implementation of `Connector`
///
/// Loopback targets whose login is the user running fleetcmd go through a local shell;
/// everything else goes over SSH with the shared fleet key, localhost included.
#[derive(Debug, Default)]
pub struct DefaultConnector {
    ssh: Option<SshConnector>,
    local_user: Option<String>,
}

impl DefaultConnector {
    /// Connector that only serves loopback targets for the current user
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            ssh: None,
            local_user: current_user(),
        }
    }

    #[must_use]
    pub fn with_ssh(ssh: SshConnector) -> Self {
        Self {
            ssh: Some(ssh),
            local_user: current_user(),
        }
    }

    /// Override the login that may skip SSH on loopback targets
    #[must_use]
    pub fn with_local_user(mut self, user: Option<String>) -> Self {
        self.local_user = user;
        self
    }

    fn runs_locally(&self, target: &ConnectionInfo) -> bool {
        target.is_local() && self.local_user.as_deref() == Some(target.user.as_str())
    }

    /// Build from configuration, resolving the SSH key once
    ///
    /// The key is only required when some entry cannot run through the local shell.
    ///
    /// # Errors
    /// Returns error if the key cannot be resolved and an entry needs it
    pub fn from_config(config: &Config, inventory: &Inventory) -> Result<Self> {
        let mut connector = Self::local_only();

        let needs_ssh = inventory
            .entries()
            .iter()
            .any(|entry| !connector.runs_locally(&ConnectionInfo::new(&entry.host, &entry.login)));

        if !needs_ssh {
            tracing::debug!("all hosts run locally, skipping SSH key");
            return Ok(connector);
        }

        let passphrase = config.ssh.passphrase.as_ref().map(|p| p.expose());
        let key = config
            .key_source()
            .resolve(passphrase)
            .wrap_err("failed to load SSH key")?;

        connector.ssh = Some(SshConnector::new(key).with_connect_timeout(config.connect_timeout()));
        Ok(connector)
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(&self, target: &ConnectionInfo) -> Result<Box<dyn RemoteSession>, ExecError> {
        if self.runs_locally(target) {
            return Ok(Box::new(LocalSession::new()));
        }
        if target.is_local() {
            tracing::debug!(
                host = %target.host,
                login = %target.user,
                "login differs from current user, connecting over SSH"
            );
        }

        match &self.ssh {
            Some(ssh) => ssh.open(target).await,
            None => Err(ExecError::SshKeyError("no SSH key configured".to_string())),
        }
    }
}

/// Login name of the user running this process
fn current_user() -> Option<String> {
    match User::from_uid(Uid::current()) {
        Ok(user) => user.map(|u| u.name),
        Err(e) => {
            tracing::warn!(error = %e, "failed to look up current user");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_key_config() -> Config {
        let mut config = Config::default();
        config.ssh.key_path = Some("/nonexistent/fleet_key".into());
        config
    }

    #[tokio::test]
    async fn test_localhost_session_for_current_user() {
        let connector = DefaultConnector::local_only().with_local_user(Some("root".to_string()));
        let session = connector
            .open(&ConnectionInfo::new("127.0.0.1", "root"))
            .await
            .unwrap();

        assert_eq!(session.session_type(), "local");
        let output = session.run("echo hi").await.unwrap();
        assert_eq!(output.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn test_localhost_other_login_needs_ssh() {
        let connector = DefaultConnector::local_only().with_local_user(Some("root".to_string()));
        let result = connector
            .open(&ConnectionInfo::new("localhost", "deploy"))
            .await;

        assert!(matches!(result, Err(ExecError::SshKeyError(_))));
    }

    #[tokio::test]
    async fn test_remote_without_key() {
        let connector = DefaultConnector::local_only();
        let result = connector.open(&ConnectionInfo::new("web1", "root")).await;

        assert!(matches!(result, Err(ExecError::SshKeyError(_))));
    }

    #[test]
    fn test_local_inventory_needs_no_key() {
        let me = current_user().unwrap();
        let inventory = Inventory::parse([format!("localhost {me}"), format!("127.0.0.1 {me}")]);

        let connector = DefaultConnector::from_config(&missing_key_config(), &inventory).unwrap();
        assert!(connector.ssh.is_none());
    }

    #[test]
    fn test_localhost_other_login_requires_key() {
        let inventory = Inventory::parse(["localhost fleetcmd-nobody-else"]);

        assert!(DefaultConnector::from_config(&missing_key_config(), &inventory).is_err());
    }

    #[test]
    fn test_remote_inventory_requires_key() {
        let me = current_user().unwrap();
        let inventory = Inventory::parse([format!("localhost {me}"), "web1 admin".to_string()]);

        assert!(DefaultConnector::from_config(&missing_key_config(), &inventory).is_err());
    }
}
