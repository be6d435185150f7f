//! fleetcmd-exec: Remote execution abstraction
//!
//! Provides the session/connector traits and their SSH and local implementations

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeyError, KeySource};
pub use local::LocalSession;
pub use result::{CommandOutput, ConnectionInfo};
pub use ssh::{SshConnector, SshSession};
pub use traits::{Connector, RemoteSession};
