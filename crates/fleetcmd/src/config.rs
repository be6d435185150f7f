//! Configuration loading and types

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::WrapErr;
use serde::Deserialize;

use fleetcmd_core::{FleetRunConfig, Secret, StaticSecrets};
use fleetcmd_exec::KeySource;

/// Top-level configuration for fleetcmd
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Command library file
    #[serde(default = "default_commands")]
    pub commands: PathBuf,
    /// Inventory file
    #[serde(default = "default_hosts")]
    pub hosts: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// SSH connection settings
    #[serde(default)]
    pub ssh: SshConfig,
    /// Run settings
    #[serde(default)]
    pub run: RunConfig,
    /// Host → sudo secret
    #[serde(default)]
    pub secrets: StaticSecrets,
    /// Extra TOML file holding a host → secret table; its entries win
    pub secrets_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            commands: default_commands(),
            hosts: default_hosts(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            ssh: SshConfig::default(),
            run: RunConfig::default(),
            secrets: StaticSecrets::default(),
            secrets_file: None,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// SSH connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Private key file shared by all hosts
    pub key_path: Option<PathBuf>,
    /// Environment variable holding a base64-encoded private key
    pub key_env: Option<String>,
    /// Key passphrase
    pub passphrase: Option<Secret>,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect + authenticate timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            key_path: None,
            key_env: None,
            passphrase: None,
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Run settings
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Hosts processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-command timeout in seconds (none by default)
    pub command_timeout_secs: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            command_timeout_secs: None,
        }
    }
}

fn default_commands() -> PathBuf {
    PathBuf::from("commands.txt")
}

fn default_hosts() -> PathBuf {
    PathBuf::from("hosts.txt")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_concurrency() -> usize {
    1
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .wrap_err_with(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("FLEETCMD_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let mut paths = vec![
            PathBuf::from("fleetcmd.toml"),
            PathBuf::from("/etc/fleetcmd/fleetcmd.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetcmd/fleetcmd.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    /// Inline secrets merged with `secrets_file`
    ///
    /// # Errors
    /// Returns error if the secrets file cannot be read or parsed
    pub fn secrets(&self) -> eyre::Result<StaticSecrets> {
        let mut secrets = self.secrets.clone();

        if let Some(path) = &self.secrets_file {
            let path = expand_home(path);
            let content = std::fs::read_to_string(&path)
                .wrap_err_with(|| format!("failed to read secrets file {}", path.display()))?;
            let from_file: StaticSecrets = toml::from_str(&content)
                .wrap_err_with(|| format!("invalid secrets file {}", path.display()))?;
            secrets.extend(from_file);
        }

        Ok(secrets)
    }

    /// Where the shared SSH key comes from; `key_path` wins over `key_env`
    #[must_use]
    pub fn key_source(&self) -> KeySource {
        match (&self.ssh.key_path, &self.ssh.key_env) {
            (Some(path), _) => KeySource::Path(expand_home(path)),
            (None, Some(var)) => KeySource::Env(var.clone()),
            (None, None) => KeySource::Path(expand_home(Path::new("~/.ssh/id_rsa"))),
        }
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }

    /// Settings handed to the orchestrator
    #[must_use]
    pub fn fleet_config(&self) -> FleetRunConfig {
        FleetRunConfig {
            concurrency: self.run.concurrency.max(1),
            port: self.ssh.port,
            command_timeout: self.run.command_timeout_secs.map(Duration::from_secs),
            ..FleetRunConfig::default()
        }
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
