//! JSON-RPC 2.0 protocol types for the daemon control channel.
//!
//! The control channel is separate from the BSP socket: it is used to probe
//! the daemon, ask it to open a BSP socket for this process, and stop it.
//! Messages are framed with a `Content-Length` header, like LSP and BSP.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// JSON-RPC 2.0 request sent to the daemon.
///
/// # Example
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 1,
///   "method": "bsp",
///   "params": {
///     "workspace": "/path/to/project",
///     "socket": "/home/me/.cache/bsp-bridge/bsp/proc-4242",
///     "clientPid": 4242
///   }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DaemonRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Unique request identifier
    pub id: u64,

    /// Method name to invoke
    pub method: Method,

    /// Method-specific parameters
    pub params: Value,
}

impl DaemonRequest {
    /// Create a new daemon request with auto-generated ID.
    pub fn new(method: Method, params: Value) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        Self {
            jsonrpc: "2.0".to_string(),
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response from the daemon.
///
/// Either `result` or `error` will be present, but not both.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DaemonResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Request ID this response corresponds to
    pub id: u64,

    /// Successful result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error result (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DaemonError>,
}

impl DaemonResponse {
    /// Create a successful response.
    pub fn success(id: u64, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    /// Create an error response.
    pub fn error(id: u64, error: DaemonError) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DaemonError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl DaemonError {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub fn parse_error() -> Self {
        Self { code: Self::PARSE_ERROR, message: "Parse error".to_string(), data: None }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self { code: Self::INTERNAL_ERROR, message: message.into(), data: None }
    }
}

/// Control methods understood by the daemon.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Report version and launch options.
    About,
    /// Open a BSP domain socket for a client.
    Bsp,
    /// Stop the daemon.
    Exit,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::About => "about",
            Self::Bsp => "bsp",
            Self::Exit => "exit",
        }
    }
}

/// What a running daemon reports about itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaemonInfo {
    pub version: String,
    #[serde(default)]
    pub jvm_options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// Parameters of the `bsp` method.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BspParams {
    /// Project the BSP session is for.
    pub workspace: PathBuf,
    /// Domain socket the daemon should listen on.
    pub socket: PathBuf,
    /// Process id of the connecting client.
    pub client_pid: u32,
}
