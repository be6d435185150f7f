//! fleetcmd
//!
//! Runs OS-specific command lists across a fleet of hosts over SSH

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::Result;
use eyre::WrapErr;
use fleetcmd_core::{
    CommandLibrary, FleetEvent, FleetOrchestrator, Inventory, OsFamily, SecretProvider,
};
use fleetcmd_exec::Connector;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogFormat};
use crate::factory::DefaultConnector;

mod config;
mod factory;
mod render;

#[derive(Parser)]
#[command(name = "fleetcmd", version)]
#[command(about = "Run OS-specific command lists across a fleet over SSH", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $FLEETCMD_CONFIG or ./fleetcmd.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the command library across the inventory
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Print the final report as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },
    /// Validate the command library and inventory without contacting any host
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Flags that override values from the configuration file
#[derive(Args, Debug, Default)]
struct Overrides {
    /// Command library file
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Inventory file
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// Private key file shared by all hosts
    #[arg(short = 'i', long)]
    key: Option<PathBuf>,

    /// SSH port
    #[arg(short, long)]
    port: Option<u16>,

    /// Hosts processed at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Per-command timeout
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Connect + authenticate timeout
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Log output format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(commands) = self.commands {
            config.commands = commands;
        }
        if let Some(hosts) = self.hosts {
            config.hosts = hosts;
        }
        if let Some(key) = self.key {
            config.ssh.key_path = Some(key);
        }
        if let Some(port) = self.port {
            config.ssh.port = port;
        }
        if let Some(concurrency) = self.concurrency {
            config.run.concurrency = concurrency;
        }
        if let Some(secs) = self.command_timeout {
            config.run.command_timeout_secs = Some(secs);
        }
        if let Some(secs) = self.connect_timeout {
            config.ssh.connect_timeout_secs = secs;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    match cli.command {
        Commands::Run { overrides, json } => {
            overrides.apply(&mut config);
            init_tracing(&config, cli.verbose);
            run(&config, json).await
        }
        Commands::Check { overrides } => {
            overrides.apply(&mut config);
            init_tracing(&config, cli.verbose);
            check(&config)
        }
    }
}

/// Logs go to stderr so stdout stays clean for progress lines and JSON
fn init_tracing(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

fn load_inputs(config: &Config) -> Result<(CommandLibrary, Inventory)> {
    let library =
        CommandLibrary::load(&config.commands).wrap_err("failed to load command library")?;
    let inventory = Inventory::load(&config.hosts)
        .wrap_err_with(|| format!("failed to read inventory {}", config.hosts.display()))?;
    Ok((library, inventory))
}

/// Load every input and wire the orchestrator; no host is contacted here
///
/// A library that fails to parse stops the run before `connector` is even built.
fn prepare<C>(
    config: &Config,
    connector: impl FnOnce(&Config, &Inventory) -> Result<C>,
) -> Result<(FleetOrchestrator, Inventory)>
where
    C: Connector + 'static,
{
    let (library, inventory) = load_inputs(config)?;
    let secrets = config.secrets()?;
    if library.is_empty() {
        warn!(path = %config.commands.display(), "command library has no commands");
    }

    let connector = connector(config, &inventory)?;
    let orchestrator = FleetOrchestrator::new(
        Arc::new(connector),
        Arc::new(library),
        Arc::new(secrets),
        config.fleet_config(),
    );

    Ok((orchestrator, inventory))
}

async fn run(config: &Config, json: bool) -> Result<ExitCode> {
    let (orchestrator, inventory) = prepare(config, DefaultConnector::from_config)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let printer = (!json).then(|| tokio::spawn(print_events(orchestrator.subscribe())));

    let report = orchestrator.run_until(&inventory, cancel).await;

    // Closes the event channel so the printer drains and exits
    drop(orchestrator);
    if let Some(printer) = printer
        && let Err(e) = printer.await
    {
        warn!(error = %e, "event printer failed");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render::summary(&report));
    }

    Ok(if report.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn print_events(mut rx: broadcast::Receiver<FleetEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = render::event_line(&event) {
                    println!("{line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "progress output fell behind, some events not shown");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Cancel the run on Ctrl+C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C"),
        () = terminate => info!("received SIGTERM"),
    }

    warn!("cancelling fleet run, hosts in flight will stop after their current command");
    cancel.cancel();
}

fn check(config: &Config) -> Result<ExitCode> {
    let (library, inventory) = load_inputs(config)?;
    let secrets = config.secrets()?;

    println!("Command library {}", config.commands.display());
    for family in OsFamily::KNOWN {
        println!(
            "  {:<10} {} command(s)",
            family.as_str(),
            library.commands_for(family).len()
        );
    }

    println!("Inventory {}", config.hosts.display());
    for entry in inventory.entries() {
        let secret = if secrets.secret_for(&entry.host).is_some() {
            "secret on record"
        } else {
            "no sudo secret, will be skipped"
        };
        println!("  {:<32} {secret}", entry.to_string());
    }
    for line in inventory.skipped() {
        println!("  skipped {line}");
    }

    Ok(if inventory.skipped().is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use fleetcmd_exec::{ConnectionInfo, ExecError, RemoteSession};

    use super::*;

    /// Refuses every connection and counts the attempts
    struct CountingConnector {
        opened: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn open(
            &self,
            _target: &ConnectionInfo,
        ) -> Result<Box<dyn RemoteSession>, ExecError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Err(ExecError::NotConnected)
        }
    }

    fn input_files(library: &str, hosts: &str) -> (tempfile::TempDir, Config) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.commands = dir.path().join("commands.txt");
        config.hosts = dir.path().join("hosts.txt");

        let mut file = std::fs::File::create(&config.commands).unwrap();
        write!(file, "{library}").unwrap();
        let mut file = std::fs::File::create(&config.hosts).unwrap();
        write!(file, "{hosts}").unwrap();

        (dir, config)
    }

    #[tokio::test]
    async fn test_bad_library_aborts_before_any_host() {
        let (_dir, config) = input_files("[debian]\nuptime\n[arch]\npacman -Syu\n", "web1 admin\n");
        let opened = Arc::new(AtomicUsize::new(0));
        let built = Arc::new(AtomicUsize::new(0));

        let result = prepare(&config, |_, _| {
            built.fetch_add(1, Ordering::SeqCst);
            Ok(CountingConnector {
                opened: opened.clone(),
            })
        });

        let err = result.err().unwrap();
        assert!(format!("{err:?}").contains("arch"));
        assert_eq!(built.load(Ordering::SeqCst), 0);
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prepare_contacts_no_host() {
        let (_dir, config) = input_files("[debian]\nuptime\n", "web1 admin\ndb1 admin\n");
        let opened = Arc::new(AtomicUsize::new(0));

        let (orchestrator, inventory) = prepare(&config, |_, _| {
            Ok(CountingConnector {
                opened: opened.clone(),
            })
        })
        .unwrap();

        assert_eq!(inventory.entries().len(), 2);
        assert_eq!(opened.load(Ordering::SeqCst), 0);

        let report = orchestrator.run(&inventory).await;
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "fleetcmd",
            "-v",
            "run",
            "--hosts",
            "fleet.txt",
            "-j",
            "4",
            "--command-timeout",
            "30",
            "--log-format",
            "json",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Commands::Run { overrides, json } = cli.command else {
            panic!("expected run");
        };
        assert!(json);

        let mut config = Config::default();
        overrides.apply(&mut config);
        assert_eq!(config.hosts, PathBuf::from("fleet.txt"));
        assert_eq!(config.run.concurrency, 4);
        assert_eq!(config.run.command_timeout_secs, Some(30));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.commands, PathBuf::from("commands.txt"));
    }

    #[test]
    fn test_cli_check_with_global_config() {
        let cli =
            Cli::try_parse_from(["fleetcmd", "check", "--config", "/etc/fleet.toml"]).unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/etc/fleet.toml")));
        assert!(matches!(cli.command, Commands::Check { .. }));
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["fleetcmd"]).is_err());
    }
}
