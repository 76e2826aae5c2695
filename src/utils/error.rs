use std::time::Duration;
use thiserror::Error;

/// Failures the orchestrator reports with a typed cause.
///
/// Operations return `anyhow::Result`; callers that need to branch on the
/// cause use `err.downcast_ref::<BridgeError>()`.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Could not resolve build server {version}: {message}")]
    Resolution { version: String, message: String },

    #[error("Timed out after {timeout:?} connecting to {address}")]
    ConnectionTimeout { address: String, timeout: Duration },

    #[error("Build server did not start within {timeout:?}")]
    StartTimeout { timeout: Duration },

    #[error("Build server error {code}: {message}")]
    Daemon { code: i32, message: String },

    #[error("Could not list JVM processes: {message}")]
    ProcessEnumeration { message: String },

    #[error("Invalid daemon address: {address}")]
    InvalidAddress { address: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
