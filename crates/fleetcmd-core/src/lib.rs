//! fleetcmd-core: OS-conditional fleet command orchestration
//!
//! Classifies each host's OS, selects its command list from the library, elevates
//! privileged commands with the host's secret and reports a structured outcome per host.

pub mod config;
pub mod error;
pub mod event;
pub mod executor;
pub mod inventory;
pub mod library;
pub mod orchestrator;
pub mod os;
pub mod report;
pub mod secrets;
pub mod state;

pub use config::FleetRunConfig;
pub use error::{HostError, LibraryError};
pub use event::FleetEvent;
pub use executor::{ExecutorRun, HostExecutor, classify_output, elevate, is_benign_sudo_prompt};
pub use inventory::{Inventory, InventoryEntry, SkippedLine};
pub use library::CommandLibrary;
pub use orchestrator::FleetOrchestrator;
pub use os::{OS_PROBE_COMMAND, OsFamily, OsRelease, classify};
pub use report::{
    Classification, ExecutionResult, FleetReport, FleetSummary, HostOutcome, HostStatus,
};
pub use secrets::{Secret, SecretProvider, StaticSecrets};
pub use state::HostStage;
