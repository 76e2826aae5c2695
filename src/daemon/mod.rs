//! The build server daemon as seen from the client side.
//!
//! The daemon runs as a separate JVM process and is driven over a small
//! JSON-RPC control channel. This module resolves its distribution, launches
//! it and speaks the control protocol.

pub mod client;
pub mod controller;
pub mod launcher;
pub mod protocol;
pub mod resolver;

pub use client::ControlClient;
pub use controller::{ProcessController, SocketController};
pub use launcher::DaemonLauncher;
pub use protocol::{BspParams, DaemonError, DaemonInfo, DaemonRequest, DaemonResponse, Method};
pub use resolver::{DaemonResolver, LocalDistribution};
