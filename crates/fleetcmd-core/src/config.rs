//! Fleet run configuration

use std::time::Duration;

use crate::os::OS_PROBE_COMMAND;

/// How a fleet run is carried out
#[derive(Debug, Clone)]
pub struct FleetRunConfig {
    /// Hosts processed at once; 1 means strictly sequential
    pub concurrency: usize,
    /// SSH port used for every inventory entry
    pub port: u16,
    /// Per-command timeout, including the OS probe
    pub command_timeout: Option<Duration>,
    /// Command whose output is classified
    pub probe_command: String,
    /// Event broadcast channel capacity
    pub event_channel_capacity: usize,
}

impl Default for FleetRunConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            port: 22,
            command_timeout: None,
            probe_command: OS_PROBE_COMMAND.to_string(),
            event_channel_capacity: 1024,
        }
    }
}
