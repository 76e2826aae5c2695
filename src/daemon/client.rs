//! Control-channel client for the build server daemon.
//!
//! Connects to the daemon's control address (TCP or a Unix domain socket)
//! and sends JSON-RPC 2.0 requests framed with Content-Length headers.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;

use super::protocol::{BspParams, DaemonInfo, DaemonRequest, DaemonResponse, Method};
use crate::bsp::config::Endpoint;
use crate::utils::error::BridgeError;

/// Default timeout for control requests (5 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for establishing the control connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Largest response body accepted from the daemon (1 MiB).
const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

trait ControlStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ControlStream for T {}

/// Client for the daemon control channel.
///
/// # Example
/// ```no_run
/// use bsp_bridge::bsp::config::Endpoint;
/// use bsp_bridge::daemon::client::ControlClient;
///
/// # async fn example() -> anyhow::Result<()> {
/// let address: Endpoint = "127.0.0.1:8212".parse()?;
/// let mut client = ControlClient::connect(&address).await?;
/// let info = client.about().await?;
/// println!("daemon {}", info.version);
/// # Ok(())
/// # }
/// ```
pub struct ControlClient {
    stream: BufReader<Box<dyn ControlStream>>,
}

impl ControlClient {
    /// Connect to the daemon at `address`.
    ///
    /// # Errors
    /// - Nothing is listening at the address
    /// - The connection did not complete within one second
    pub async fn connect(address: &Endpoint) -> Result<Self> {
        let stream: Box<dyn ControlStream> = match address {
            Endpoint::Tcp { host, port } => {
                let stream = timeout(CONNECT_TIMEOUT, tokio::net::TcpStream::connect((host.as_str(), *port)))
                    .await
                    .context("Timed out connecting to daemon")?
                    .with_context(|| format!("Failed to connect to daemon at {address}"))?;
                Box::new(stream)
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = timeout(CONNECT_TIMEOUT, tokio::net::UnixStream::connect(path))
                    .await
                    .context("Timed out connecting to daemon")?
                    .with_context(|| format!("Failed to connect to daemon at {address}"))?;
                Box::new(stream)
            }
        };

        tracing::debug!("Connected to daemon control channel at {address}");

        Ok(Self { stream: BufReader::new(stream) })
    }

    /// Send a JSON-RPC request and wait for its response.
    ///
    /// # Errors
    /// - Timeout waiting for response
    /// - IO error communicating with the daemon
    /// - Malformed response framing or JSON
    pub async fn send_request(&mut self, method: Method, params: Value) -> Result<DaemonResponse> {
        let request = DaemonRequest::new(method, params);
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize request")?;

        let message = format!("Content-Length: {}\r\n\r\n{}", request_json.len(), request_json);

        timeout(DEFAULT_TIMEOUT, async {
            self.stream
                .write_all(message.as_bytes())
                .await
                .context("Failed to write request to daemon")?;
            self.stream.flush().await.context("Failed to flush request to daemon")?;

            tracing::debug!("Sent request: method={}", method.as_str());

            self.read_response().await
        })
        .await
        .context("Request timed out")?
    }

    /// Read a framed JSON-RPC response.
    ///
    /// ```text
    /// Content-Length: 123\r\n
    /// \r\n
    /// {"jsonrpc":"2.0",...}
    /// ```
    async fn read_response(&mut self) -> Result<DaemonResponse> {
        let mut header_line = String::new();
        let read = self
            .stream
            .read_line(&mut header_line)
            .await
            .context("Failed to read Content-Length header")?;
        if read == 0 {
            anyhow::bail!("Daemon closed the control connection");
        }

        let content_length = header_line
            .trim()
            .strip_prefix("Content-Length: ")
            .context("Invalid header: missing Content-Length")?
            .parse::<usize>()
            .context("Invalid Content-Length value")?;
        if content_length > MAX_RESPONSE_BYTES {
            anyhow::bail!(
                "Response of {content_length} bytes exceeds the {MAX_RESPONSE_BYTES} byte limit"
            );
        }

        let mut empty_line = String::new();
        self.stream.read_line(&mut empty_line).await.context("Failed to read header separator")?;
        if !empty_line.trim().is_empty() {
            anyhow::bail!("Expected empty line after Content-Length header");
        }

        let mut body = vec![0u8; content_length];
        self.stream.read_exact(&mut body).await.context("Failed to read response body")?;

        let response: DaemonResponse =
            serde_json::from_slice(&body).context("Failed to parse JSON response")?;

        tracing::debug!("Received response: id={}", response.id);

        Ok(response)
    }

    async fn call<T: DeserializeOwned>(&mut self, method: Method, params: Value) -> Result<T> {
        let response = self.send_request(method, params).await?;

        if let Some(error) = response.error {
            return Err(BridgeError::Daemon { code: error.code, message: error.message }.into());
        }

        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize {} result", method.as_str()))
    }

    /// Ask the daemon for its version and launch options.
    pub async fn about(&mut self) -> Result<DaemonInfo> {
        self.call(Method::About, serde_json::json!({})).await
    }

    /// Ask the daemon to listen for a BSP session on `params.socket`.
    pub async fn open_bsp(&mut self, params: &BspParams) -> Result<()> {
        let params = serde_json::to_value(params).context("Failed to serialize bsp params")?;
        let _: Value = self.call(Method::Bsp, params).await?;
        Ok(())
    }

    /// Ask the daemon to shut down.
    pub async fn exit(&mut self) -> Result<()> {
        let _: Value = self.call(Method::Exit, serde_json::json!({})).await?;
        tracing::info!("Daemon shutdown requested");
        Ok(())
    }
}
