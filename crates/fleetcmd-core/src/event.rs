//! Structured progress events emitted during a fleet run

use serde::Serialize;

use crate::inventory::SkippedLine;
use crate::os::OsFamily;
use crate::report::{ExecutionResult, HostStatus};
use crate::state::HostStage;

/// Progress of a fleet run, one event per observable step
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    /// Run started
    RunStarted { hosts: usize },
    /// Inventory line skipped
    InventoryLineSkipped { line: SkippedLine },
    /// Host moved to a new stage
    HostStageChanged {
        host: String,
        from: HostStage,
        to: HostStage,
    },
    /// OS family detected
    HostClassified {
        host: String,
        os_family: OsFamily,
        os_name: Option<String>,
    },
    /// A library command finished (or could not run)
    CommandFinished { result: ExecutionResult },
    /// Host reached a terminal status
    HostFinished {
        host: String,
        status: HostStatus,
        error: Option<String>,
    },
    /// Run finished
    RunFinished { cancelled: bool },
}
