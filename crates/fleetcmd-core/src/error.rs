//! Core error types for fleetcmd-core

use std::path::PathBuf;

use thiserror::Error;

use fleetcmd_exec::ExecError;

/// Malformed command library; fatal to the whole run
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Section header names something other than a known OS family
    #[error("line {line}: unknown OS family section [{name}] (expected debian, opensuse or rocky)")]
    UnknownSection {
        /// 1-based line number
        line: usize,
        /// Lower-cased section name as written
        name: String,
    },

    /// Library file could not be read
    #[error("failed to read command library {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a single host stopped before running its commands
///
/// Host-local: recorded in that host's outcome, never propagated to the fleet run.
#[derive(Error, Debug, Clone)]
pub enum HostError {
    /// Session could not be opened or the OS probe could not be run
    #[error("connection error: {0}")]
    Connection(#[from] ExecError),

    /// OS probe output matched no known family
    #[error("could not determine OS family")]
    ClassificationUnknown,

    /// No elevation secret on record for the host
    #[error("no sudo secret defined for {0}")]
    SecretMissing(String),

    /// Run was cancelled
    #[error("cancelled")]
    Cancelled,
}
