//! Connecting a build client to the build server over BSP.
//!
//! The daemon is started on demand, asked to open a BSP domain socket for a
//! workspace, and the socket is wrapped in a [`connection::SocketConnection`]
//! whose completion can be observed once.

pub mod config;
pub mod connection;
pub mod connector;
pub mod prompt;
pub mod reconcile;
pub mod servers;

#[cfg(test)]
pub(crate) mod fakes;

pub use config::{ConnectionConfig, Endpoint, UserConfiguration};
pub use connection::{Closure, CompletionSignal, SocketConnection};
pub use servers::{BuildServers, DaemonState, ReconcileOutcome};
