//! Starting the daemon when nothing answers at the configured address.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

use super::controller::{LaunchCommand, ProcessController};
use super::resolver::DaemonResolver;
use crate::bsp::config::{ConnectionConfig, Endpoint};
use crate::bsp::connector::deadline_passed;
use crate::bsp::prompt::{PromptAction, PromptRequest, PromptService};
use crate::utils::error::BridgeError;

/// Entry point of the daemon distribution.
pub const DAEMON_MAIN_CLASS: &str = "bloop.BloopServer";

/// Entry point of the previous daemon generation, which holds the same port
/// and must not run next to the current one.
pub const LEGACY_MAIN_CLASS: &str = "bloop.Server";

const fn java_executable() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

const fn jps_executable() -> &'static str {
    if cfg!(windows) {
        "jps.exe"
    } else {
        "jps"
    }
}

/// Runtime home to use: the configured one, else `JAVA_HOME`.
pub fn resolve_java_home(configured: Option<&Path>, env_home: Option<OsString>) -> Option<PathBuf> {
    configured
        .map(Path::to_path_buf)
        .or_else(|| env_home.filter(|home| !home.is_empty()).map(PathBuf::from))
}

/// `<home>/bin/java`, or plain `java` from `PATH` without a home.
pub fn java_binary(home: Option<&Path>) -> PathBuf {
    home.map_or_else(|| PathBuf::from(java_executable()), |h| h.join("bin").join(java_executable()))
}

/// `<home>/bin/jps`, or plain `jps` from `PATH` without a home.
pub fn jps_binary(home: Option<&Path>) -> PathBuf {
    home.map_or_else(|| PathBuf::from(jps_executable()), |h| h.join("bin").join(jps_executable()))
}

/// `<java> <jvm options> -cp <classpath> <main class> --address <address>`.
pub fn launch_command(java: PathBuf, classpath: &[PathBuf], config: &ConnectionConfig) -> Result<LaunchCommand> {
    let classpath = std::env::join_paths(classpath).context("Invalid daemon classpath entry")?;

    let mut args = config.jvm_options.clone();
    args.push("-cp".to_string());
    args.push(classpath.to_string_lossy().into_owned());
    args.push(DAEMON_MAIN_CLASS.to_string());
    args.push("--address".to_string());
    args.push(config.address.to_string());

    Ok(LaunchCommand { program: java, args, log_dir: config.work_dir.clone() })
}

/// Starts the daemon on demand.
pub struct DaemonLauncher {
    controller: Arc<dyn ProcessController>,
    resolver: Arc<dyn DaemonResolver>,
    prompt: Arc<dyn PromptService>,
    legacy_checked: OnceCell<()>,
}

impl DaemonLauncher {
    pub fn new(
        controller: Arc<dyn ProcessController>,
        resolver: Arc<dyn DaemonResolver>,
        prompt: Arc<dyn PromptService>,
    ) -> Self {
        Self { controller, resolver, prompt, legacy_checked: OnceCell::new() }
    }

    /// Make sure a daemon answers at `config.address`, starting `version`
    /// if nothing does.
    ///
    /// # Errors
    /// - [`BridgeError::Resolution`] if the distribution cannot be found
    /// - the daemon process could not be spawned
    /// - [`BridgeError::StartTimeout`] if it never started answering
    pub async fn ensure_started(&self, config: &ConnectionConfig, version: &str) -> Result<()> {
        if self.controller.check(&config.address).await {
            tracing::debug!("Build server already running at {}", config.address);
            return Ok(());
        }

        let java_home = resolve_java_home(config.java_home.as_deref(), std::env::var_os("JAVA_HOME"));
        let java = java_binary(java_home.as_deref());
        let classpath = self.resolver.resolve(version).await?;

        self.legacy_checked
            .get_or_init(|| self.stop_legacy_daemon(jps_binary(java_home.as_deref())))
            .await;

        let command = launch_command(java, &classpath, config)?;
        tracing::info!("Starting build server {version} at {}", config.address);
        self.controller.start(&command).await?;

        self.wait_until_running(config).await
    }

    async fn wait_until_running(&self, config: &ConnectionConfig) -> Result<()> {
        let started = Instant::now();
        let deadline = started + config.start_check_timeout;

        loop {
            tokio::time::sleep(config.start_check_period).await;
            if self.controller.check(&config.address).await {
                tracing::info!("Build server ready after {:?}", started.elapsed());
                return Ok(());
            }
            if deadline_passed(Instant::now(), deadline) {
                return Err(BridgeError::StartTimeout { timeout: config.start_check_timeout }.into());
            }
        }
    }

    /// Offer to stop a running legacy daemon. Failures are only logged.
    async fn stop_legacy_daemon(&self, jps: PathBuf) {
        let processes = match self.controller.jvm_processes(&jps).await {
            Ok(processes) => processes,
            Err(e) => {
                tracing::warn!("Skipping legacy build server check: {e:#}");
                return;
            }
        };

        let Some(legacy) = processes.into_iter().find(|p| p.main_class == LEGACY_MAIN_CLASS) else {
            return;
        };

        let request = PromptRequest::legacy_daemon(legacy.pid, &legacy.main_class);
        if self.prompt.ask(request).await != Some(PromptAction::Terminate) {
            tracing::info!("Leaving legacy build server (pid {}) running", legacy.pid);
            return;
        }

        match self.controller.terminate(legacy.pid).await {
            Ok(()) => tracing::info!("Stopped legacy build server (pid {})", legacy.pid),
            Err(e) => tracing::warn!("Failed to stop legacy build server: {e:#}"),
        }
    }

    /// Whether a daemon is answering at `address`.
    pub async fn is_running(&self, address: &Endpoint) -> bool {
        self.controller.check(address).await
    }
}
