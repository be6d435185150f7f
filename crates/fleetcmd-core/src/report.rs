//! Per-command results, per-host outcomes and the fleet report

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::inventory::{InventoryEntry, SkippedLine};
use crate::os::OsFamily;

/// How a single command went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// stderr clean and exit status zero (or not reported)
    Ok,
    /// stderr clean but non-zero exit status
    Warning,
    /// stderr carried real output, or the command never ran
    Error,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Classification::Ok => "ok",
            Classification::Warning => "warning",
            Classification::Error => "error",
        })
    }
}

/// Result of one library command on one host
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Host the command ran on
    pub host: String,
    /// Command as written in the library (never the secret-bearing rewrite)
    pub command: String,
    /// Whether the command was run with elevation
    pub privileged: bool,
    pub stdout: String,
    pub stderr: String,
    /// Exit status, absent if the command never ran or none was reported
    pub exit_status: Option<i32>,
    pub classification: Classification,
    /// Why the command did not produce output (missing secret, timeout, transport error)
    pub error: Option<String>,
    pub duration: Duration,
}

impl ExecutionResult {
    /// A command that could not be run at all
    pub fn not_run(
        host: impl Into<String>,
        command: impl Into<String>,
        privileged: bool,
        error: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            command: command.into(),
            privileged,
            stdout: String::new(),
            stderr: String::new(),
            exit_status: None,
            classification: Classification::Error,
            error: Some(error.into()),
            duration: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.classification == Classification::Error
    }
}

/// Terminal status of one inventory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatus {
    /// All commands were attempted
    Completed,
    /// OS could not be classified
    SkippedNoOs,
    /// No elevation secret on record
    SkippedNoSecret,
    /// Session could not be opened or the probe failed
    ConnectionFailed,
    /// Run cancelled before or during this host
    Cancelled,
    /// Host task panicked
    Aborted,
}

impl HostStatus {
    #[must_use]
    pub fn is_completed(self) -> bool {
        self == HostStatus::Completed
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostStatus::Completed => "completed",
            HostStatus::SkippedNoOs => "skipped (unknown OS)",
            HostStatus::SkippedNoSecret => "skipped (no sudo secret)",
            HostStatus::ConnectionFailed => "connection failed",
            HostStatus::Cancelled => "cancelled",
            HostStatus::Aborted => "aborted",
        })
    }
}

/// What happened to one inventory entry
#[derive(Debug, Clone, Serialize)]
pub struct HostOutcome {
    pub host: String,
    pub login: String,
    pub os_family: OsFamily,
    /// `PRETTY_NAME` from the probe, when available
    pub os_name: Option<String>,
    /// Command results in library order
    pub results: Vec<ExecutionResult>,
    pub status: HostStatus,
    /// Reason for a non-completed status
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl HostOutcome {
    /// Fresh outcome for an entry; status is filled in when the host finishes
    pub(crate) fn start(entry: &InventoryEntry) -> Self {
        let now = Utc::now();
        Self {
            host: entry.host.clone(),
            login: entry.login.clone(),
            os_family: OsFamily::Unknown,
            os_name: None,
            results: Vec::new(),
            status: HostStatus::Cancelled,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(mut self, status: HostStatus, error: Option<String>) -> Self {
        self.status = status;
        self.error = error;
        self.finished_at = Utc::now();
        self
    }

    /// Number of commands classified as errors
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }
}

/// Counts over a fleet report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FleetSummary {
    pub total_hosts: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub commands_ok: usize,
    pub commands_warning: usize,
    pub commands_error: usize,
}

/// Everything a fleet run produced
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One outcome per inventory entry, in inventory order
    pub outcomes: Vec<HostOutcome>,
    /// Inventory lines that produced no entry
    pub skipped_lines: Vec<SkippedLine>,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl FleetReport {
    #[must_use]
    pub fn summary(&self) -> FleetSummary {
        let mut summary = FleetSummary {
            total_hosts: self.outcomes.len(),
            ..FleetSummary::default()
        };

        for outcome in &self.outcomes {
            match outcome.status {
                HostStatus::Completed => summary.completed += 1,
                HostStatus::SkippedNoOs | HostStatus::SkippedNoSecret => summary.skipped += 1,
                HostStatus::ConnectionFailed | HostStatus::Aborted => summary.failed += 1,
                HostStatus::Cancelled => summary.cancelled += 1,
            }
            for result in &outcome.results {
                match result.classification {
                    Classification::Ok => summary.commands_ok += 1,
                    Classification::Warning => summary.commands_warning += 1,
                    Classification::Error => summary.commands_error += 1,
                }
            }
        }

        summary
    }

    /// Every host completed and no command errored
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status.is_completed() && o.error_count() == 0)
    }
}
