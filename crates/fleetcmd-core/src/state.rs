//! Per-host state machine

use std::fmt;

use serde::Serialize;

/// Stages a host passes through during a fleet run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStage {
    PendingConnect,
    Connected,
    Classified,
    Dispatched,
    Done,
    Failed,
}

impl HostStage {
    /// Forward-only transitions; any non-terminal stage may fail
    #[must_use]
    pub fn can_transition_to(self, next: HostStage) -> bool {
        use HostStage::{Classified, Connected, Dispatched, Done, Failed, PendingConnect};

        matches!(
            (self, next),
            (PendingConnect, Connected)
                | (Connected, Classified)
                | (Classified, Dispatched)
                | (Dispatched, Done)
                | (PendingConnect | Connected | Classified | Dispatched, Failed)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, HostStage::Done | HostStage::Failed)
    }
}

impl fmt::Display for HostStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HostStage::PendingConnect => "pending_connect",
            HostStage::Connected => "connected",
            HostStage::Classified => "classified",
            HostStage::Dispatched => "dispatched",
            HostStage::Done => "done",
            HostStage::Failed => "failed",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let path = [
            HostStage::PendingConnect,
            HostStage::Connected,
            HostStage::Classified,
            HostStage::Dispatched,
            HostStage::Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!HostStage::PendingConnect.can_transition_to(HostStage::Dispatched));
        assert!(!HostStage::Done.can_transition_to(HostStage::Failed));
        assert!(!HostStage::Failed.can_transition_to(HostStage::Connected));
        assert!(HostStage::Classified.can_transition_to(HostStage::Failed));
        assert!(HostStage::Failed.is_terminal());
    }
}
