//! User configuration and the per-attempt connection configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::utils::error::BridgeError;

/// Daemon version used when the user does not pin one.
pub const DEFAULT_DAEMON_VERSION: &str = "2.0.0";

/// Launch options used when the user does not provide any.
pub const DEFAULT_JVM_OPTIONS: &[&str] = &["-Xss4m", "-XX:MaxInlineLevel=20"];

/// Control address of a daemon started with default settings.
pub const DEFAULT_DAEMON_ADDRESS: &str = "127.0.0.1:8212";

pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_millis(100);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_START_CHECK_PERIOD: Duration = Duration::from_millis(100);
pub const DEFAULT_START_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory name used below the platform cache/config/data directories.
pub const APP_DIR: &str = "bsp-bridge";

/// Settings the user can change, as read from `config.json`.
///
/// ```json
/// {
///   "daemonVersion": "2.0.0",
///   "daemonJvmProperties": ["-Xmx2G"],
///   "javaHome": "/usr/lib/jvm/java-17",
///   "daemonDir": "/home/me/.cache/bsp",
///   "daemonAddress": "127.0.0.1:8212"
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfiguration {
    /// Pinned daemon version; `None` means the built-in default.
    pub daemon_version: Option<String>,

    /// Extra launch options for the daemon JVM.
    pub daemon_jvm_properties: Vec<String>,

    /// Runtime home used to locate `bin/java`.
    pub java_home: Option<PathBuf>,

    /// Custom storage directory for daemon sockets.
    pub daemon_dir: Option<PathBuf>,

    /// Control address, `host:port` or `unix:<path>`.
    pub daemon_address: Option<String>,
}

impl UserConfiguration {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// Load the configuration from the default location, falling back to
    /// defaults when no file exists.
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Version the daemon should be running.
    pub fn effective_version(&self) -> &str {
        self.daemon_version.as_deref().unwrap_or(DEFAULT_DAEMON_VERSION)
    }

    /// Launch options the daemon should be started with.
    pub fn effective_jvm_options(&self) -> Vec<String> {
        if self.daemon_jvm_properties.is_empty() {
            DEFAULT_JVM_OPTIONS.iter().map(ToString::to_string).collect()
        } else {
            self.daemon_jvm_properties.clone()
        }
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        let address = self.daemon_address.as_deref().unwrap_or(DEFAULT_DAEMON_ADDRESS);
        Ok(address.parse()?)
    }
}

/// `<config_dir>/bsp-bridge/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
}

/// Where a daemon accepts control connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BridgeError::InvalidAddress { address: s.to_string() };

        if let Some(path) = s.strip_prefix("unix:") {
            #[cfg(unix)]
            {
                if path.is_empty() {
                    return Err(invalid());
                }
                return Ok(Self::Unix(PathBuf::from(path)));
            }
            #[cfg(not(unix))]
            {
                let _ = path;
                return Err(invalid());
            }
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self::Tcp { host: host.to_string(), port })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Everything needed for one connection attempt. Built fresh each time.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Control address of the daemon.
    pub address: Endpoint,
    /// Domain socket the daemon is asked to open for BSP traffic.
    pub bsp_socket: PathBuf,
    pub period: Duration,
    pub timeout: Duration,
    pub start_check_period: Duration,
    pub start_check_timeout: Duration,
    pub version: String,
    pub jvm_options: Vec<String>,
    pub java_home: Option<PathBuf>,
    /// Base directory holding the `bsp/` socket directory.
    pub work_dir: PathBuf,
}

impl ConnectionConfig {
    /// Build the configuration for the current process.
    pub fn build(user: &UserConfiguration) -> Result<Self> {
        let work_dir = match &user.daemon_dir {
            Some(dir) => dir.clone(),
            None => dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join(APP_DIR),
        };
        Self::build_in(user, &work_dir, std::process::id())
    }

    /// Build the configuration with an explicit base directory and process id.
    ///
    /// Creates `<work_dir>/bsp` (mode 0700 on unix) if it does not exist yet.
    pub fn build_in(user: &UserConfiguration, work_dir: &Path, pid: u32) -> Result<Self> {
        let socket_dir = work_dir.join("bsp");
        create_private_dir(&socket_dir)
            .with_context(|| format!("Failed to create socket directory {}", socket_dir.display()))?;

        Ok(Self {
            address: user.endpoint()?,
            bsp_socket: socket_dir.join(format!("proc-{pid}")),
            period: DEFAULT_RETRY_PERIOD,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            start_check_period: DEFAULT_START_CHECK_PERIOD,
            start_check_timeout: DEFAULT_START_CHECK_TIMEOUT,
            version: user.effective_version().to_string(),
            jvm_options: user.effective_jvm_options(),
            java_home: user.java_home.clone(),
            work_dir: work_dir.to_path_buf(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, period: Duration, timeout: Duration) -> Self {
        self.period = period;
        self.timeout = timeout;
        self
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
