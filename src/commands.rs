use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use bsp_bridge::bsp::{BuildServers, Closure, DaemonState, SocketConnection, UserConfiguration};

use crate::cli::output::{OutputFormatter, StatusReport};

/// Copy bytes both ways between the client and the build server until either
/// side stops, then close the connection.
pub async fn proxy<R, W>(connection: &mut SocketConnection, mut client_in: R, mut client_out: W) -> Closure
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let signal = connection.on_closed();
    let closer = connection.closer();
    let (server_in, server_out) = connection.split();

    let stopped = tokio::select! {
        result = tokio::io::copy(server_in, &mut client_out) => {
            result.map(|n| format!("build server finished after {n} bytes"))
        }
        result = tokio::io::copy(&mut client_in, server_out) => {
            result.map(|n| format!("client finished after {n} bytes"))
        }
        closure = signal.closed() => Ok(format!("connection closed: {closure:?}")),
    };

    match stopped {
        Ok(reason) => tracing::debug!("Proxy stopped, {reason}"),
        Err(e) => tracing::debug!("Proxy stopped: {e}"),
    }
    if let Err(e) = client_out.flush().await {
        tracing::debug!("Failed to flush client output: {e}");
    }

    closer.close();
    signal.result().unwrap_or(Closure::Clean)
}

pub async fn handle_connect(
    servers: &Arc<BuildServers>,
    workspace: &Path,
    user: &UserConfiguration,
    health_interval: Option<u64>,
) -> Result<()> {
    let mut connection = servers.new_connection(workspace, user).await?;
    let health = health_interval
        .filter(|secs| *secs > 0)
        .map(|secs| servers.spawn_health_check(Duration::from_secs(secs)));

    let closure = proxy(&mut connection, tokio::io::stdin(), tokio::io::stdout()).await;

    if let Some(health) = health {
        health.abort();
    }
    match closure {
        Closure::Clean => Ok(()),
        Closure::Failed(message) => {
            anyhow::bail!("Connection to {} failed: {message}", connection.name())
        }
    }
}

pub async fn handle_status(
    servers: &BuildServers,
    user: &UserConfiguration,
    formatter: &OutputFormatter,
) -> Result<()> {
    let address = user.endpoint()?;
    let state = servers.daemon_state().await;
    let daemon = if state == DaemonState::Running {
        match servers.daemon_info().await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!("Daemon is reachable but did not answer the about request: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let report = StatusReport { address: address.to_string(), state, daemon };
    println!("{}", formatter.format_status(&report));
    Ok(())
}

pub async fn handle_shutdown(servers: &BuildServers) -> Result<()> {
    if servers.daemon_state().await != DaemonState::Running {
        println!("Build server is not running");
        return Ok(());
    }

    if !servers.shutdown_server().await {
        anyhow::bail!("Build server did not shut down");
    }
    println!("Build server stopped");
    Ok(())
}

pub async fn handle_reconcile(
    servers: &BuildServers,
    previous: &Path,
    user: &UserConfiguration,
    formatter: &OutputFormatter,
) -> Result<()> {
    let old = UserConfiguration::load(previous)?;
    let outcome = servers.reconcile_configuration(&old, user, || servers.start_server(user)).await;
    println!("{}", formatter.format_reconcile(outcome));
    Ok(())
}

pub fn handle_config(
    servers: &BuildServers,
    user: &UserConfiguration,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = servers.connection_config(user)?;
    println!("{}", formatter.format_config(&config));
    Ok(())
}
