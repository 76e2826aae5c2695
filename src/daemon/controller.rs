//! Process-level operations on the daemon behind one trait.
//!
//! Everything that touches other processes (probing, spawning, listing JVMs,
//! signalling) goes through [`ProcessController`] so the orchestration logic
//! can run against a fake in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use super::client::ControlClient;
use super::protocol::{BspParams, DaemonInfo};
use crate::bsp::config::Endpoint;
use crate::utils::error::BridgeError;
use crate::utils::log_bridge::{DaemonStream, LogBridge};

/// A program and its arguments, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Directory receiving the daemon's stdout and stderr log files.
    pub log_dir: PathBuf,
}

/// One line of `jps -l` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvmProcess {
    pub pid: u32,
    pub main_class: String,
}

/// Parse `jps -l` output: `<pid> <main class or jar>` per line.
pub fn parse_jps_output(output: &str) -> Vec<JvmProcess> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let pid = parts.next()?.parse().ok()?;
            let main_class = parts.next().unwrap_or_default().to_string();
            Some(JvmProcess { pid, main_class })
        })
        .collect()
}

#[async_trait]
pub trait ProcessController: Send + Sync {
    /// Whether a daemon answers at `address`.
    async fn check(&self, address: &Endpoint) -> bool;

    /// The running daemon's self-description.
    async fn about(&self, address: &Endpoint) -> Result<DaemonInfo>;

    /// Start the daemon as a detached background process.
    async fn start(&self, command: &LaunchCommand) -> Result<()>;

    /// Ask the daemon to open a BSP socket.
    async fn open_bsp(&self, address: &Endpoint, params: &BspParams) -> Result<()>;

    /// Stop the daemon; zero means success.
    async fn exit(&self, address: &Endpoint) -> i32;

    /// JVM processes visible to `jps`.
    async fn jvm_processes(&self, jps: &Path) -> Result<Vec<JvmProcess>>;

    async fn terminate(&self, pid: u32) -> Result<()>;
}

/// The real controller: talks to the daemon's control channel and spawns
/// processes. Daemon output goes to log files, which are followed into a
/// [`LogBridge`] for as long as this process runs.
pub struct SocketController {
    logs: Arc<LogBridge>,
}

impl SocketController {
    pub fn new(logs: Arc<LogBridge>) -> Self {
        Self { logs }
    }
}

impl Default for SocketController {
    fn default() -> Self {
        Self::new(Arc::new(LogBridge::tracing()))
    }
}

#[async_trait]
impl ProcessController for SocketController {
    async fn check(&self, address: &Endpoint) -> bool {
        match self.about(address).await {
            Ok(info) => {
                tracing::debug!("Daemon {} is running at {address}", info.version);
                true
            }
            Err(e) => {
                tracing::debug!("No daemon at {address}: {e:#}");
                false
            }
        }
    }

    async fn about(&self, address: &Endpoint) -> Result<DaemonInfo> {
        ControlClient::connect(address).await?.about().await
    }

    async fn start(&self, command: &LaunchCommand) -> Result<()> {
        std::fs::create_dir_all(&command.log_dir).with_context(|| {
            format!("Failed to create daemon log directory {}", command.log_dir.display())
        })?;
        let (stdout, stdout_offset) = open_log(&command.log_dir, DaemonStream::Stdout)?;
        let (stderr, stderr_offset) = open_log(&command.log_dir, DaemonStream::Stderr)?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Own process group, so the daemon survives the terminal closing.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn daemon '{}'", command.program.display()))?;

        match child.id() {
            Some(pid) => tracing::info!("Started build server daemon (pid {pid})"),
            None => tracing::info!("Started build server daemon"),
        }

        // JoinHandles intentionally not stored: the tasks end with the runtime.
        let logs = [(DaemonStream::Stdout, stdout_offset), (DaemonStream::Stderr, stderr_offset)];
        for (stream, offset) in logs {
            self.logs.follow(command.log_dir.join(stream.file_name()), offset, stream);
        }
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::info!("Build server daemon exited: {status}"),
                Err(e) => tracing::warn!("Failed to wait for build server daemon: {e}"),
            }
        });

        Ok(())
    }

    async fn open_bsp(&self, address: &Endpoint, params: &BspParams) -> Result<()> {
        ControlClient::connect(address).await?.open_bsp(params).await
    }

    async fn exit(&self, address: &Endpoint) -> i32 {
        let result = match ControlClient::connect(address).await {
            Ok(mut client) => client.exit().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => 0,
            Err(e) => {
                tracing::debug!("Exit request to {address} failed: {e:#}");
                match e.downcast_ref::<BridgeError>() {
                    Some(BridgeError::Daemon { code, .. }) if *code != 0 => *code,
                    _ => 1,
                }
            }
        }
    }

    async fn jvm_processes(&self, jps: &Path) -> Result<Vec<JvmProcess>> {
        let output = tokio::process::Command::new(jps).arg("-l").output().await.map_err(|e| {
            BridgeError::ProcessEnumeration { message: format!("{}: {e}", jps.display()) }
        })?;

        if !output.status.success() {
            return Err(BridgeError::ProcessEnumeration {
                message: format!(
                    "{} exited with {}: {}",
                    jps.display(),
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }

        Ok(parse_jps_output(&String::from_utf8_lossy(&output.stdout)))
    }

    #[cfg(unix)]
    async fn terminate(&self, pid: u32) -> Result<()> {
        let pid = libc::pid_t::try_from(pid).context("Process id out of range")?;
        // SAFETY: kill(2) has no memory-safety preconditions; an invalid pid
        // is reported through the return value.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to terminate process {pid}"));
        }
        Ok(())
    }

    #[cfg(not(unix))]
    async fn terminate(&self, pid: u32) -> Result<()> {
        let status = tokio::process::Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/F"])
            .status()
            .await
            .context("Failed to run taskkill")?;
        if !status.success() {
            anyhow::bail!("taskkill for process {pid} exited with {status}");
        }
        Ok(())
    }
}

/// Open the log file for `stream` in append mode, with its current length.
fn open_log(dir: &Path, stream: DaemonStream) -> Result<(File, u64)> {
    let path = dir.join(stream.file_name());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open daemon log {}", path.display()))?;
    let offset = file.metadata().map(|meta| meta.len()).unwrap_or(0);
    Ok((file, offset))
}
