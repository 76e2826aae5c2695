#![allow(dead_code)]

use bsp_bridge::daemon::protocol::{BspParams, DaemonError, DaemonRequest, DaemonResponse, Method};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A stand-in build server daemon speaking the control protocol on a domain
/// socket. BSP sessions it opens echo every byte back.
pub struct FakeDaemon {
    pub socket: PathBuf,
    pub version: String,
    methods: Arc<Mutex<Vec<Method>>>,
    handle: JoinHandle<()>,
}

impl FakeDaemon {
    /// Start serving on `<dir>/control.sock`. Must be called inside a runtime.
    pub fn spawn(dir: &Path, version: &str) -> Self {
        let socket = dir.join("control.sock");
        let listener = UnixListener::bind(&socket).expect("failed to bind control socket");
        let methods = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(Notify::new());

        let handle = tokio::spawn({
            let methods = Arc::clone(&methods);
            let version = version.to_string();
            async move {
                loop {
                    tokio::select! {
                        accepted = listener.accept() => {
                            let Ok((stream, _)) = accepted else { break };
                            tokio::spawn(serve(stream, version.clone(), Arc::clone(&methods), Arc::clone(&stop)));
                        }
                        () = stop.notified() => break,
                    }
                }
            }
        });

        Self { socket, version: version.to_string(), methods, handle }
    }

    /// `--address` value pointing at this daemon.
    pub fn address(&self) -> String {
        format!("unix:{}", self.socket.display())
    }

    pub fn methods(&self) -> Vec<Method> {
        self.methods.lock().unwrap().clone()
    }

    /// Whether the accept loop has ended (after an `exit` request).
    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(stream: UnixStream, version: String, methods: Arc<Mutex<Vec<Method>>>, stop: Arc<Notify>) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
            return;
        }
        let Some(len) = header.trim().strip_prefix("Content-Length: ").and_then(|n| n.parse().ok())
        else {
            reply(&mut reader, &DaemonResponse::error(0, DaemonError::parse_error())).await;
            return;
        };
        let mut blank = String::new();
        reader.read_line(&mut blank).await.unwrap();
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).await.unwrap();

        let request: DaemonRequest = serde_json::from_slice(&body).unwrap();
        methods.lock().unwrap().push(request.method);

        let response = match request.method {
            Method::About => DaemonResponse::success(
                request.id,
                json!({ "version": version, "jvmOptions": ["-Xss4m"], "pid": std::process::id() }),
            ),
            Method::Bsp => {
                let params: BspParams = serde_json::from_value(request.params).unwrap();
                match open_echo_session(&params.socket) {
                    Ok(()) => DaemonResponse::success(request.id, json!(null)),
                    Err(e) => DaemonResponse::error(request.id, DaemonError::internal_error(e.to_string())),
                }
            }
            Method::Exit => {
                reply(&mut reader, &DaemonResponse::success(request.id, json!(null))).await;
                stop.notify_one();
                return;
            }
        };
        reply(&mut reader, &response).await;
    }
}

async fn reply(reader: &mut BufReader<UnixStream>, response: &DaemonResponse) {
    let body = serde_json::to_string(response).unwrap();
    let message = format!("Content-Length: {}\r\n\r\n{body}", body.len());
    let stream = reader.get_mut();
    stream.write_all(message.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();
}

/// Listen on `socket` and echo the first session back to the client.
fn open_echo_session(socket: &Path) -> std::io::Result<()> {
    let _ = std::fs::remove_file(socket);
    let listener = UnixListener::bind(socket)?;
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let (mut read, mut write) = stream.into_split();
            let _ = tokio::io::copy(&mut read, &mut write).await;
        }
    });
    Ok(())
}

/// Write a configuration file into `dir` and return its path.
pub fn write_config(dir: &Path, config: &serde_json::Value) -> PathBuf {
    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::to_vec_pretty(config).unwrap()).unwrap();
    path
}
