//! Runs a host's command list over an open session
//!
//! Commands that mention `sudo` are rewritten to feed the host's secret to `sudo -S`.
//! The rewritten text carries the secret, so it is only ever handed to the session; logs,
//! events and results keep the library text.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use fleetcmd_exec::{CommandOutput, RemoteSession};

use crate::event::FleetEvent;
use crate::library::CommandLibrary;
use crate::os::OsFamily;
use crate::report::{Classification, ExecutionResult};
use crate::secrets::{Secret, SecretProvider};

/// Substring that marks a command as needing privilege elevation
pub const SUDO_MARKER: &str = "sudo";

/// Prefix of the prompt `sudo -S` writes to stderr before reading the password
const SUDO_PROMPT_PREFIX: &str = "[sudo] password for ";

/// Whether a library command needs elevation
#[must_use]
pub fn is_privileged(command: &str) -> bool {
    command.contains(SUDO_MARKER)
}

/// Rewrite a privileged command so `sudo -S` reads the secret from stdin
///
/// A leading `sudo` is replaced so elevation happens once. Any other command runs whole
/// under `sudo -S sh -c`, since it may start with a shell builtin or a pipeline.
#[must_use]
pub fn elevate(command: &str, secret: &Secret) -> String {
    let trimmed = command.trim();
    let elevated = match trimmed
        .strip_prefix(SUDO_MARKER)
        .filter(|rest| rest.starts_with(char::is_whitespace))
    {
        Some(rest) => rest.trim_start().to_string(),
        None => format!("sh -c {}", shell_quote(trimmed)),
    };

    format!(
        "printf '%s\\n' {} | sudo -S {elevated}",
        shell_quote(secret.expose())
    )
}

/// Whether stderr is nothing but the password prompt echoed by `sudo -S`
///
/// Matches `[sudo] password for <user>:` with surrounding whitespace only. A prompt
/// followed by any other output is not benign.
#[must_use]
pub fn is_benign_sudo_prompt(stderr: &str) -> bool {
    stderr
        .trim()
        .strip_prefix(SUDO_PROMPT_PREFIX)
        .and_then(|rest| rest.strip_suffix(':'))
        .is_some_and(|user| !user.is_empty() && !user.contains(char::is_whitespace))
}

/// Classify captured output
///
/// Clean stderr (empty or only the sudo prompt) is `Ok`, or `Warning` when the exit status
/// is non-zero. Anything else on stderr is `Error`.
#[must_use]
pub fn classify_output(output: &CommandOutput) -> Classification {
    let stderr_clean = output.stderr.trim().is_empty() || is_benign_sudo_prompt(&output.stderr);

    match (stderr_clean, output.status) {
        (false, _) => Classification::Error,
        (true, Some(_)) if !output.success() => Classification::Warning,
        (true, _) => Classification::Ok,
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Results of one executor pass over a host
#[derive(Debug, Clone, Default)]
pub struct ExecutorRun {
    /// One result per attempted command, in library order
    pub results: Vec<ExecutionResult>,
    /// Whether the pass stopped early because of cancellation
    pub cancelled: bool,
}

/// Runs the library commands for one OS family on one host
pub struct HostExecutor {
    library: Arc<CommandLibrary>,
    secrets: Arc<dyn SecretProvider>,
    command_timeout: Option<Duration>,
    event_tx: Option<broadcast::Sender<FleetEvent>>,
}

impl HostExecutor {
    pub fn new(library: Arc<CommandLibrary>, secrets: Arc<dyn SecretProvider>) -> Self {
        Self {
            library,
            secrets,
            command_timeout: None,
            event_tx: None,
        }
    }

    /// Give up on any single command after `timeout`
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Publish a `CommandFinished` event per command
    #[must_use]
    pub fn with_events(mut self, event_tx: broadcast::Sender<FleetEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Run every command for `family`, in order, regardless of earlier failures
    pub async fn run(
        &self,
        session: &dyn RemoteSession,
        family: OsFamily,
        host: &str,
    ) -> Vec<ExecutionResult> {
        self.run_cancellable(session, family, host, &CancellationToken::new())
            .await
            .results
    }

    /// Like [`run`](Self::run), stopping before the next command once `cancel` fires
    ///
    /// A command in flight when cancellation fires is abandoned and gets no result.
    #[instrument(skip(self, session, cancel), fields(transport = session.session_type()))]
    pub async fn run_cancellable(
        &self,
        session: &dyn RemoteSession,
        family: OsFamily,
        host: &str,
        cancel: &CancellationToken,
    ) -> ExecutorRun {
        let commands = self.library.commands_for(family);
        let mut run = ExecutorRun {
            results: Vec::with_capacity(commands.len()),
            cancelled: false,
        };

        for command in commands {
            if cancel.is_cancelled() {
                run.cancelled = true;
                break;
            }

            let finished = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = self.run_one(session, host, command) => Some(result),
            };

            let Some(result) = finished else {
                warn!(host, command = %command, "command abandoned on cancellation");
                run.cancelled = true;
                break;
            };

            if let Some(tx) = &self.event_tx {
                let _ = tx.send(FleetEvent::CommandFinished {
                    result: result.clone(),
                });
            }
            run.results.push(result);
        }

        debug!(
            host,
            attempted = run.results.len(),
            total = commands.len(),
            cancelled = run.cancelled,
            "command list finished"
        );

        run
    }

    async fn run_one(
        &self,
        session: &dyn RemoteSession,
        host: &str,
        command: &str,
    ) -> ExecutionResult {
        let privileged = is_privileged(command);

        let line = if privileged {
            match self.secrets.secret_for(host) {
                Some(secret) => elevate(command, &secret),
                None => {
                    warn!(
                        host,
                        command = %command,
                        "no sudo secret for privileged command, not sending"
                    );
                    return ExecutionResult::not_run(
                        host,
                        command,
                        true,
                        format!("no sudo secret defined for {host}"),
                    );
                }
            }
        } else {
            command.to_string()
        };

        info!(host, command = %command, privileged, "executing");

        let output = match self.command_timeout {
            Some(timeout) => session.run_with_timeout(&line, timeout).await,
            None => session.run(&line).await,
        };

        match output {
            Ok(output) => {
                let classification = classify_output(&output);
                match classification {
                    Classification::Error => {
                        warn!(
                            host,
                            command = %command,
                            stderr = %output.stderr.trim(),
                            "command reported errors"
                        );
                    }
                    Classification::Warning => {
                        warn!(
                            host,
                            command = %command,
                            status = ?output.status,
                            "command exited non-zero"
                        );
                    }
                    Classification::Ok => {}
                }

                ExecutionResult {
                    host: host.to_string(),
                    command: command.to_string(),
                    privileged,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_status: output.status,
                    classification,
                    error: None,
                    duration: output.duration,
                }
            }
            Err(e) => {
                error!(host, command = %command, error = %e, "command could not be run");
                ExecutionResult::not_run(host, command, privileged, e.to_string())
            }
        }
    }
}
