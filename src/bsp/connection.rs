//! Owned BSP streams with an observable close signal.
//!
//! A [`SocketConnection`] owns both directions of the transport. Whichever of
//! read EOF, a read/write error or an explicit [`SocketConnection::close`]
//! happens first resolves the connection's [`CompletionSignal`]; later
//! resolutions are ignored.

use std::fmt;
use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    Clean,
    Failed(String),
}

/// Single-assignment cell, first writer wins.
#[derive(Clone)]
pub struct CompletionSignal {
    state: Arc<watch::Sender<Option<Closure>>>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self { state: Arc::new(state) }
    }

    /// Resolve the signal. Returns `false` if it had already been resolved.
    pub fn resolve(&self, closure: Closure) -> bool {
        self.state.send_if_modified(move |state| {
            if state.is_some() {
                return false;
            }
            *state = Some(closure);
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn result(&self) -> Option<Closure> {
        self.state.borrow().clone()
    }

    /// Wait until the signal is resolved.
    pub async fn closed(&self) -> Closure {
        let mut rx = self.state.subscribe();
        let result = match rx.wait_for(Option::is_some).await {
            Ok(state) => state.clone(),
            Err(_) => None,
        };
        result.unwrap_or(Closure::Clean)
    }
}

impl Default for CompletionSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking handle kept next to the async halves so `close` can shut the
/// socket down even while another task is reading from it.
enum RawTransport {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl RawTransport {
    fn shutdown(&self) -> io::Result<()> {
        match *self {
            #[cfg(unix)]
            Self::Unix(ref stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

/// Idempotent closer shared by a connection and its owner.
#[derive(Clone)]
pub struct ConnectionCloser {
    transport: Arc<RawTransport>,
    closed: Arc<AtomicBool>,
    signal: CompletionSignal,
}

impl ConnectionCloser {
    /// Shut the transport down. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Err(e) = self.transport.shutdown() {
            tracing::debug!("Socket shutdown reported: {e}");
        }
        self.signal.resolve(Closure::Clean);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.signal.is_resolved()
    }
}

/// Read half. EOF and read errors resolve the connection's signal.
pub struct ConnectionInput {
    inner: Box<dyn AsyncRead + Send + Unpin>,
    signal: CompletionSignal,
}

impl AsyncRead for ConnectionInput {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        let wanted = buf.remaining() > 0;
        let before = buf.filled().len();

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                if wanted && buf.filled().len() == before {
                    this.signal.resolve(Closure::Clean);
                }
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => {
                this.signal.resolve(Closure::Failed(e.to_string()));
                Poll::Ready(Err(e))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Write half. Write errors resolve the connection's signal.
pub struct ConnectionOutput {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
    signal: CompletionSignal,
}

impl ConnectionOutput {
    fn track<T>(&self, result: Poll<io::Result<T>>) -> Poll<io::Result<T>> {
        if let Poll::Ready(Err(e)) = &result {
            self.signal.resolve(Closure::Failed(e.to_string()));
        }
        result
    }
}

impl AsyncWrite for ConnectionOutput {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let result = Pin::new(&mut self.inner).poll_write(cx, buf);
        self.track(result)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_flush(cx);
        self.track(result)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        self.track(result)
    }
}

/// A connected BSP transport. Dropping it closes the socket.
pub struct SocketConnection {
    name: String,
    input: ConnectionInput,
    output: ConnectionOutput,
    closer: ConnectionCloser,
}

impl SocketConnection {
    /// Wrap a connected domain socket. Must be called inside a tokio runtime.
    #[cfg(unix)]
    pub fn from_unix(name: impl Into<String>, stream: std::os::unix::net::UnixStream) -> io::Result<Self> {
        let raw = stream.try_clone()?;
        stream.set_nonblocking(true)?;
        let (read, write) = tokio::net::UnixStream::from_std(stream)?.into_split();
        Ok(Self::assemble(name.into(), Box::new(read), Box::new(write), RawTransport::Unix(raw)))
    }

    fn assemble(
        name: String,
        read: Box<dyn AsyncRead + Send + Unpin>,
        write: Box<dyn AsyncWrite + Send + Unpin>,
        raw: RawTransport,
    ) -> Self {
        let signal = CompletionSignal::new();
        let closer = ConnectionCloser {
            transport: Arc::new(raw),
            closed: Arc::new(AtomicBool::new(false)),
            signal: signal.clone(),
        };
        Self {
            name,
            input: ConnectionInput { inner: read, signal: signal.clone() },
            output: ConnectionOutput { inner: write, signal },
            closer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input(&mut self) -> &mut ConnectionInput {
        &mut self.input
    }

    pub fn output(&mut self) -> &mut ConnectionOutput {
        &mut self.output
    }

    /// Borrow both halves at once, e.g. to pump them concurrently.
    pub fn split(&mut self) -> (&mut ConnectionInput, &mut ConnectionOutput) {
        (&mut self.input, &mut self.output)
    }

    /// Signal resolved when the transport closes.
    pub fn on_closed(&self) -> CompletionSignal {
        self.closer.signal.clone()
    }

    pub fn closer(&self) -> ConnectionCloser {
        self.closer.clone()
    }

    pub fn close(&self) -> bool {
        self.closer.close()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }
}

impl fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConnection")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Drop for SocketConnection {
    fn drop(&mut self) {
        self.closer.close();
    }
}
