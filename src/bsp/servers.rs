//! Orchestrates launching, connecting to and reconciling the build server.
//!
//! [`BuildServers`] is what the rest of the tool talks to. It owns the
//! process controller, the launcher and the prompt service, and keeps at
//! most one BSP connection open at a time.

use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::config::{ConnectionConfig, Endpoint, UserConfiguration};
use super::connection::{ConnectionCloser, SocketConnection};
use super::prompt::{PromptAction, PromptRequest, PromptService};
use super::reconcile::{properties_change_prompt, version_event, VersionMismatchEvent};
use crate::daemon::controller::ProcessController;
use crate::daemon::launcher::DaemonLauncher;
use crate::daemon::protocol::DaemonInfo;
use crate::daemon::resolver::DaemonResolver;

/// Label given to connections to the daemon.
pub const DAEMON_NAME: &str = "build-server";

/// What a health check of the control address found.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DaemonState {
    Unknown,
    NotRunning,
    Running,
}

/// Result of a reconciliation check.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// Nothing changed that warrants a restart.
    Unchanged,
    /// The user was asked and chose not to restart.
    Declined,
    /// The daemon was shut down and the reconnect callback ran.
    Reconnected,
}

pub struct BuildServers {
    controller: Arc<dyn ProcessController>,
    prompt: Arc<dyn PromptService>,
    launcher: DaemonLauncher,
    user_config: Mutex<UserConfiguration>,
    retry: Option<(Duration, Duration)>,
    active: Mutex<Option<ConnectionCloser>>,
    last_state: Mutex<DaemonState>,
    connecting: tokio::sync::Mutex<()>,
    reconnecting: tokio::sync::Mutex<()>,
}

impl BuildServers {
    pub fn new(
        user_config: UserConfiguration,
        controller: Arc<dyn ProcessController>,
        resolver: Arc<dyn DaemonResolver>,
        prompt: Arc<dyn PromptService>,
    ) -> Self {
        let launcher = DaemonLauncher::new(Arc::clone(&controller), resolver, Arc::clone(&prompt));
        Self {
            controller,
            prompt,
            launcher,
            user_config: Mutex::new(user_config),
            retry: None,
            active: Mutex::new(None),
            last_state: Mutex::new(DaemonState::Unknown),
            connecting: tokio::sync::Mutex::new(()),
            reconnecting: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the socket retry period and total timeout.
    #[must_use]
    pub fn with_retry(mut self, period: Duration, timeout: Duration) -> Self {
        self.retry = Some((period, timeout));
        self
    }

    fn address(&self) -> Result<Endpoint> {
        self.user_config.lock().expect("user config mutex poisoned").endpoint()
    }

    /// Build the connection configuration for `user`, with retry overrides.
    pub fn connection_config(&self, user: &UserConfiguration) -> Result<ConnectionConfig> {
        let config = ConnectionConfig::build(user)?;
        Ok(match self.retry {
            Some((period, timeout)) => config.with_retry(period, timeout),
            None => config,
        })
    }

    /// Start the daemon for `user` unless one already answers.
    pub async fn start_server(&self, user: &UserConfiguration) -> Result<ConnectionConfig> {
        *self.user_config.lock().expect("user config mutex poisoned") = user.clone();

        let config = self.connection_config(user)?;
        self.launcher
            .ensure_started(&config, &config.version)
            .await
            .context("Failed to start build server")?;
        Ok(config)
    }

    /// Start the daemon if needed and open a fresh BSP connection for `root`.
    ///
    /// Any connection previously opened through this instance is closed first.
    /// Concurrent calls are serialized, so only the last one stays open.
    pub async fn new_connection(
        &self,
        root: &Path,
        user: &UserConfiguration,
    ) -> Result<SocketConnection> {
        let _guard = self.connecting.lock().await;
        let config = self.start_server(user).await?;

        self.close_active();
        let connection = self.open_socket(root, &config).await?;
        *self.active.lock().expect("active connection mutex poisoned") = Some(connection.closer());

        tracing::info!("Connected to {} at {}", connection.name(), config.bsp_socket.display());
        Ok(connection)
    }

    #[cfg(unix)]
    async fn open_socket(&self, root: &Path, config: &ConnectionConfig) -> Result<SocketConnection> {
        use super::connector::connect_unix;
        use crate::daemon::protocol::BspParams;

        remove_stale_socket(&config.bsp_socket)?;

        let params = BspParams {
            workspace: root.to_path_buf(),
            socket: config.bsp_socket.clone(),
            client_pid: std::process::id(),
        };
        self.controller
            .open_bsp(&config.address, &params)
            .await
            .context("Build server did not accept the BSP session request")?;

        let (socket, period, timeout) = (config.bsp_socket.clone(), config.period, config.timeout);
        let stream = tokio::task::spawn_blocking(move || connect_unix(&socket, period, timeout))
            .await
            .context("BSP connect task failed")??;

        Ok(SocketConnection::from_unix(format!("{DAEMON_NAME} {}", config.version), stream)?)
    }

    #[cfg(not(unix))]
    async fn open_socket(&self, _root: &Path, _config: &ConnectionConfig) -> Result<SocketConnection> {
        anyhow::bail!("BSP domain sockets are only supported on Unix systems")
    }

    fn close_active(&self) {
        let previous = self.active.lock().expect("active connection mutex poisoned").take();
        if let Some(previous) = previous {
            if previous.close() {
                tracing::info!("Closed previous BSP connection");
            }
        }
    }

    /// Stop the daemon. Returns `false` (and logs a warning) on failure.
    pub async fn shutdown_server(&self) -> bool {
        let address = match self.address() {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("Cannot shut down build server: {e:#}");
                return false;
            }
        };

        let code = self.controller.exit(&address).await;
        if code == 0 {
            tracing::info!("Build server at {address} shut down");
            true
        } else {
            tracing::warn!("Build server at {address} did not shut down (exit code {code})");
            false
        }
    }

    /// Offer a restart if the configured version no longer matches the
    /// running one.
    pub async fn ensure_desired_version<F, Fut, T>(
        &self,
        expected: &str,
        running: &str,
        user_defined_new: bool,
        user_defined_old: bool,
        reconnect: F,
    ) -> ReconcileOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let event = VersionMismatchEvent {
            expected: expected.to_string(),
            running: running.to_string(),
            user_defined_new,
            user_defined_old,
        };
        if !event.needs_reconnect() {
            return ReconcileOutcome::Unchanged;
        }
        self.offer_reconnect(event.prompt(), reconnect).await
    }

    /// Offer a restart if the daemon launch options changed.
    pub async fn check_properties_changed<F, Fut, T>(
        &self,
        old: &[String],
        new: &[String],
        reconnect: F,
    ) -> ReconcileOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match properties_change_prompt(old, new) {
            Some(request) => self.offer_reconnect(request, reconnect).await,
            None => ReconcileOutcome::Unchanged,
        }
    }

    /// Run both checks for a configuration update against the running daemon.
    ///
    /// A launch options change is offered first, then a version mismatch.
    /// Declining the first still shows the second; accepting either restarts
    /// once. Nothing is offered when no daemon answers.
    pub async fn reconcile_configuration<F, Fut, T>(
        &self,
        old: &UserConfiguration,
        new: &UserConfiguration,
        reconnect: F,
    ) -> ReconcileOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        *self.user_config.lock().expect("user config mutex poisoned") = new.clone();

        let info = match self.daemon_info().await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("Nothing to reconcile: {e:#}");
                return ReconcileOutcome::Unchanged;
            }
        };

        let mut requests = Vec::with_capacity(2);
        let (old_options, new_options) = (old.effective_jvm_options(), new.effective_jvm_options());
        requests.extend(properties_change_prompt(&old_options, &new_options));
        let event = version_event(old, new, &info.version);
        if event.needs_reconnect() {
            requests.push(event.prompt());
        }
        if requests.is_empty() {
            return ReconcileOutcome::Unchanged;
        }

        let _guard = self.reconnecting.lock().await;
        for request in requests {
            if self.confirm_restart(request).await {
                return self.restart(reconnect).await;
            }
        }
        ReconcileOutcome::Declined
    }

    async fn offer_reconnect<F, Fut, T>(&self, request: PromptRequest, reconnect: F) -> ReconcileOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _guard = self.reconnecting.lock().await;
        if !self.confirm_restart(request).await {
            return ReconcileOutcome::Declined;
        }
        self.restart(reconnect).await
    }

    /// Ask `request`; only an offered `Reconnect` answer confirms.
    async fn confirm_restart(&self, request: PromptRequest) -> bool {
        let answer = self.prompt.ask(request.clone()).await;
        let confirmed =
            answer.is_some_and(|answer| answer == PromptAction::Reconnect && request.accepts(answer));
        if !confirmed {
            tracing::debug!("Build server restart declined: {}", request.topic);
        }
        confirmed
    }

    /// Caller holds `reconnecting`.
    async fn restart<F, Fut, T>(&self, reconnect: F) -> ReconcileOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.shutdown_server().await;
        if let Err(e) = reconnect().await {
            tracing::warn!("Reconnecting to the build server failed: {e:#}");
        }
        ReconcileOutcome::Reconnected
    }

    /// What the running daemon reports about itself.
    pub async fn daemon_info(&self) -> Result<DaemonInfo> {
        let address = self.address()?;
        self.controller.about(&address).await
    }

    /// Check whether a daemon answers at the control address.
    pub async fn daemon_state(&self) -> DaemonState {
        let state = match self.address() {
            Ok(address) if self.launcher.is_running(&address).await => DaemonState::Running,
            Ok(_) => DaemonState::NotRunning,
            Err(_) => DaemonState::Unknown,
        };
        *self.last_state.lock().expect("state mutex poisoned") = state;
        state
    }

    /// State observed by the most recent check.
    pub fn last_known_state(&self) -> DaemonState {
        *self.last_state.lock().expect("state mutex poisoned")
    }

    /// Check the daemon every `interval`, logging state transitions.
    pub fn spawn_health_check(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let servers = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut previous = DaemonState::Unknown;
            loop {
                ticker.tick().await;
                let state = servers.daemon_state().await;
                if state == previous {
                    continue;
                }
                match state {
                    DaemonState::Running => tracing::info!("Build server is running"),
                    DaemonState::NotRunning => tracing::warn!("Build server is not running"),
                    DaemonState::Unknown => tracing::warn!("Build server state unknown"),
                }
                previous = state;
            }
        })
    }
}

#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove stale socket {}", path.display())),
    }
}
