#![cfg(unix)]

#[path = "common.rs"]
mod common;

use bsp_bridge::bsp::prompt::FixedAnswer;
use bsp_bridge::bsp::{BuildServers, Closure, DaemonState, ReconcileOutcome, UserConfiguration};
use bsp_bridge::daemon::protocol::Method;
use bsp_bridge::daemon::{LocalDistribution, SocketController};
use bsp_bridge::utils::error::BridgeError;
use common::FakeDaemon;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn build_servers(tmp: &TempDir, user: &UserConfiguration, accept: bool) -> BuildServers {
    let prompt = if accept { FixedAnswer::accept() } else { FixedAnswer::decline() };
    BuildServers::new(
        user.clone(),
        Arc::new(SocketController::default()),
        Arc::new(LocalDistribution::new(tmp.path().join("distribution"))),
        Arc::new(prompt),
    )
    .with_retry(Duration::from_millis(20), Duration::from_secs(5))
}

fn user_for(tmp: &TempDir, daemon: &FakeDaemon) -> UserConfiguration {
    UserConfiguration {
        daemon_address: Some(daemon.address()),
        daemon_dir: Some(tmp.path().to_path_buf()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_connect_to_running_daemon_and_exchange_bytes() {
    let tmp = TempDir::new().unwrap();
    let daemon = FakeDaemon::spawn(tmp.path(), "2.0.0");
    let user = user_for(&tmp, &daemon);
    let servers = build_servers(&tmp, &user, false);

    let mut connection = servers.new_connection(tmp.path(), &user).await.unwrap();
    assert_eq!(connection.name(), "build-server 2.0.0");

    let closed = connection.on_closed();
    connection.output().write_all(b"Content-Length: 2\r\n\r\n{}").await.unwrap();
    connection.output().flush().await.unwrap();

    let mut echoed = vec![0u8; 23];
    connection.input().read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"Content-Length: 2\r\n\r\n{}");

    assert!(connection.close());
    assert_eq!(closed.closed().await, Closure::Clean);
    assert_eq!(daemon.methods(), vec![Method::About, Method::Bsp]);
}

#[tokio::test]
async fn test_second_connection_replaces_first() {
    let tmp = TempDir::new().unwrap();
    let daemon = FakeDaemon::spawn(tmp.path(), "2.0.0");
    let user = user_for(&tmp, &daemon);
    let servers = build_servers(&tmp, &user, false);

    let first = servers.new_connection(tmp.path(), &user).await.unwrap();
    let second = servers.new_connection(tmp.path(), &user).await.unwrap();

    assert!(first.is_closed());
    assert!(!second.is_closed());
}

#[tokio::test]
async fn test_status_and_shutdown() {
    let tmp = TempDir::new().unwrap();
    let daemon = FakeDaemon::spawn(tmp.path(), "2.0.0");
    let user = user_for(&tmp, &daemon);
    let servers = build_servers(&tmp, &user, false);

    assert_eq!(servers.daemon_state().await, DaemonState::Running);
    assert_eq!(servers.daemon_info().await.unwrap().version, "2.0.0");

    assert!(servers.shutdown_server().await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(daemon.is_stopped());
    assert_eq!(daemon.methods().last(), Some(&Method::Exit));
}

#[tokio::test]
async fn test_reconcile_declined_leaves_daemon_running() {
    let tmp = TempDir::new().unwrap();
    let daemon = FakeDaemon::spawn(tmp.path(), "1.3.0");
    let old = user_for(&tmp, &daemon);
    let new = UserConfiguration { daemon_version: Some("1.4.0".into()), ..old.clone() };
    let servers = build_servers(&tmp, &old, false);

    let outcome = servers.reconcile_configuration(&old, &new, || servers.start_server(&new)).await;

    assert_eq!(outcome, ReconcileOutcome::Declined);
    assert!(!daemon.methods().contains(&Method::Exit));
}

#[tokio::test]
async fn test_missing_distribution_is_resolution_error() {
    let tmp = TempDir::new().unwrap();
    let user = UserConfiguration {
        daemon_address: Some(format!("unix:{}", tmp.path().join("nobody.sock").display())),
        daemon_dir: Some(tmp.path().to_path_buf()),
        ..Default::default()
    };
    let servers = build_servers(&tmp, &user, false);

    let err = servers.new_connection(tmp.path(), &user).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BridgeError>(),
        Some(BridgeError::Resolution { version, .. }) if version == "2.0.0"
    ));
}
