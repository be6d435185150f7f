//! `FleetOrchestrator`: runs the command library across an inventory
//!
//! Each entry is driven through `PendingConnect → Connected → Classified → Dispatched →
//! Done`, or stops in `Failed`. A host's failure is recorded in its outcome and never
//! stops the run.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use fleetcmd_exec::{CommandOutput, ConnectionInfo, Connector, ExecError, RemoteSession};

use crate::config::FleetRunConfig;
use crate::error::HostError;
use crate::event::FleetEvent;
use crate::executor::HostExecutor;
use crate::inventory::{Inventory, InventoryEntry};
use crate::library::CommandLibrary;
use crate::os::{OsRelease, classify};
use crate::report::{FleetReport, HostOutcome, HostStatus};
use crate::secrets::SecretProvider;
use crate::state::HostStage;

/// Tracks one host's stage and publishes transitions
struct StageTracker<'a> {
    host: &'a str,
    stage: HostStage,
    event_tx: &'a broadcast::Sender<FleetEvent>,
}

impl<'a> StageTracker<'a> {
    fn new(host: &'a str, event_tx: &'a broadcast::Sender<FleetEvent>) -> Self {
        Self {
            host,
            stage: HostStage::PendingConnect,
            event_tx,
        }
    }

    fn transition_to(&mut self, next: HostStage) {
        if !self.stage.can_transition_to(next) {
            error!(host = %self.host, from = %self.stage, to = %next, "invalid state transition");
            return;
        }

        let from = self.stage;
        self.stage = next;

        if next.is_terminal() {
            info!(host = %self.host, from = %from, to = %next, "state transition");
        } else {
            debug!(host = %self.host, from = %from, to = %next, "state transition");
        }

        // Ignore send errors (no subscribers is fine)
        let _ = self.event_tx.send(FleetEvent::HostStageChanged {
            host: self.host.to_string(),
            from,
            to: next,
        });
    }
}

/// Runs the command library across a fleet
///
/// Cheap to clone; all dependencies are shared read-only.
#[derive(Clone)]
pub struct FleetOrchestrator {
    connector: Arc<dyn Connector>,
    secrets: Arc<dyn SecretProvider>,
    executor: Arc<HostExecutor>,
    config: FleetRunConfig,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl FleetOrchestrator {
    pub fn new(
        connector: Arc<dyn Connector>,
        library: Arc<CommandLibrary>,
        secrets: Arc<dyn SecretProvider>,
        config: FleetRunConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        let executor = HostExecutor::new(library, secrets.clone())
            .with_command_timeout(config.command_timeout)
            .with_events(event_tx.clone());

        Self {
            connector,
            secrets,
            executor: Arc::new(executor),
            config,
            event_tx,
        }
    }

    /// Receive progress events for subsequent runs
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: FleetEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Process every inventory entry to completion
    pub async fn run(&self, inventory: &Inventory) -> FleetReport {
        self.run_until(inventory, CancellationToken::new()).await
    }

    /// Process every inventory entry, stopping early once `cancel` fires
    ///
    /// Hosts not yet started are reported as cancelled without being contacted; hosts in
    /// flight close their session and report what they finished.
    #[instrument(skip_all, fields(hosts = inventory.entries().len()))]
    pub async fn run_until(&self, inventory: &Inventory, cancel: CancellationToken) -> FleetReport {
        let started_at = Utc::now();
        let entries = inventory.entries();

        info!(
            total_hosts = entries.len(),
            skipped_lines = inventory.skipped().len(),
            concurrency = self.config.concurrency,
            "starting fleet run"
        );

        self.emit(FleetEvent::RunStarted {
            hosts: entries.len(),
        });
        for line in inventory.skipped() {
            self.emit(FleetEvent::InventoryLineSkipped { line: line.clone() });
        }

        let mut outcomes = Vec::with_capacity(entries.len());

        if self.config.concurrency <= 1 {
            for entry in entries {
                outcomes.push(self.process_host(entry, &cancel).await);
            }
        } else {
            for batch in entries.chunks(self.config.concurrency) {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|entry| {
                        let this = self.clone();
                        let task_entry = entry.clone();
                        let cancel = cancel.clone();
                        let handle = tokio::spawn(async move {
                            this.process_host(&task_entry, &cancel).await
                        });
                        (entry, handle)
                    })
                    .collect();

                // Join in inventory order
                for (entry, handle) in handles {
                    match handle.await {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(e) => {
                            error!(host = %entry.host, error = %e, "host task panicked");
                            let outcome = HostOutcome::start(entry).finish(
                                HostStatus::Aborted,
                                Some(format!("host task failed: {e}")),
                            );
                            self.emit(FleetEvent::HostFinished {
                                host: entry.host.clone(),
                                status: outcome.status,
                                error: outcome.error.clone(),
                            });
                            outcomes.push(outcome);
                        }
                    }
                }
            }
        }

        let cancelled = cancel.is_cancelled();
        let report = FleetReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
            skipped_lines: inventory.skipped().to_vec(),
            cancelled,
        };

        let summary = report.summary();
        info!(
            total = summary.total_hosts,
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "fleet run finished"
        );
        self.emit(FleetEvent::RunFinished { cancelled });

        report
    }

    /// Drive one inventory entry to a terminal outcome
    #[instrument(skip(self, cancel), fields(host = %entry.host))]
    pub async fn process_host(
        &self,
        entry: &InventoryEntry,
        cancel: &CancellationToken,
    ) -> HostOutcome {
        let mut outcome = HostOutcome::start(entry);
        let mut tracker = StageTracker::new(&entry.host, &self.event_tx);

        let (status, error) = match self.drive(entry, cancel, &mut outcome, &mut tracker).await {
            Ok(status) => (status, None),
            Err(e) => {
                let status = match &e {
                    HostError::Connection(_) => HostStatus::ConnectionFailed,
                    HostError::ClassificationUnknown => HostStatus::SkippedNoOs,
                    HostError::SecretMissing(_) => HostStatus::SkippedNoSecret,
                    HostError::Cancelled => HostStatus::Cancelled,
                };
                warn!(host = %entry.host, status = %status, error = %e, "host did not complete");
                (status, Some(e.to_string()))
            }
        };

        tracker.transition_to(if status.is_completed() {
            HostStage::Done
        } else {
            HostStage::Failed
        });

        self.emit(FleetEvent::HostFinished {
            host: entry.host.clone(),
            status,
            error: error.clone(),
        });

        outcome.finish(status, error)
    }

    async fn drive(
        &self,
        entry: &InventoryEntry,
        cancel: &CancellationToken,
        outcome: &mut HostOutcome,
        tracker: &mut StageTracker<'_>,
    ) -> Result<HostStatus, HostError> {
        if cancel.is_cancelled() {
            return Err(HostError::Cancelled);
        }

        let target = ConnectionInfo::new(&entry.host, &entry.login).with_port(self.config.port);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            opened = self.connector.open(&target) => Some(opened),
        };
        let session = opened.ok_or(HostError::Cancelled)??;
        tracker.transition_to(HostStage::Connected);

        let result = self
            .drive_session(entry, session.as_ref(), cancel, outcome, tracker)
            .await;

        // Released on every path, including failures after connect
        if let Err(e) = session.close().await {
            warn!(host = %entry.host, error = %e, "failed to close session");
        }

        result
    }

    async fn drive_session(
        &self,
        entry: &InventoryEntry,
        session: &dyn RemoteSession,
        cancel: &CancellationToken,
        outcome: &mut HostOutcome,
        tracker: &mut StageTracker<'_>,
    ) -> Result<HostStatus, HostError> {
        let probed = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            probed = self.probe(session) => Some(probed),
        };
        let probe = probed.ok_or(HostError::Cancelled)??;

        let family = classify(&probe.stdout);
        let release = OsRelease::parse(&probe.stdout);
        outcome.os_family = family;
        outcome.os_name = release.display_name().map(str::to_string);

        if !family.is_known() {
            return Err(HostError::ClassificationUnknown);
        }

        info!(host = %entry.host, os_family = %family, os_name = ?outcome.os_name, "detected OS");
        tracker.transition_to(HostStage::Classified);
        self.emit(FleetEvent::HostClassified {
            host: entry.host.clone(),
            os_family: family,
            os_name: outcome.os_name.clone(),
        });

        // Strict policy: no secret, no execution, even for unprivileged command lists
        if self.secrets.secret_for(&entry.host).is_none() {
            return Err(HostError::SecretMissing(entry.host.clone()));
        }
        tracker.transition_to(HostStage::Dispatched);

        let run = self
            .executor
            .run_cancellable(session, family, &entry.host, cancel)
            .await;
        outcome.results = run.results;

        if run.cancelled {
            Err(HostError::Cancelled)
        } else {
            Ok(HostStatus::Completed)
        }
    }

    async fn probe(&self, session: &dyn RemoteSession) -> Result<CommandOutput, ExecError> {
        match self.config.command_timeout {
            Some(timeout) => {
                session
                    .run_with_timeout(&self.config.probe_command, timeout)
                    .await
            }
            None => session.run(&self.config.probe_command).await,
        }
    }
}
