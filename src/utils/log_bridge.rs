//! Line-oriented bridge from raw daemon output to `tracing`.
//!
//! The daemon writes stdout and stderr to log files in its work directory so
//! it never depends on this process staying alive. While we are alive the
//! files are followed and their bytes arrive here as arbitrary chunks. Each
//! stream gets a [`LineBuffer`] that only ever hands complete lines to its
//! sink and keeps the unterminated tail around until the next chunk arrives.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;

/// Receives one complete line at a time, without its terminator.
pub type LineSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Target used for lines forwarded from the daemon process.
pub const DAEMON_LOG_TARGET: &str = "bsp_bridge::daemon";

const FOLLOW_CHUNK_SIZE: usize = 8 * 1024;

/// How long a follower waits after reaching the end of a log file.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(100);

/// Which daemon output channel a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStream {
    Stdout,
    Stderr,
}

impl DaemonStream {
    /// Log file name for this stream inside the daemon's work directory.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Stdout => "daemon.out.log",
            Self::Stderr => "daemon.err.log",
        }
    }
}

/// Accumulates bytes for one stream and emits complete lines.
pub struct LineBuffer {
    pending: Mutex<Vec<u8>>,
    sink: LineSink,
}

impl LineBuffer {
    pub fn new(sink: LineSink) -> Self {
        Self { pending: Mutex::new(Vec::new()), sink }
    }

    /// Append a chunk and flush every line it completes.
    ///
    /// Lines are emitted while the buffer lock is held so that concurrent
    /// writers cannot reorder or interleave them.
    pub fn push(&self, chunk: &[u8]) {
        let mut pending = self.pending.lock().expect("log buffer mutex poisoned");
        pending.extend_from_slice(chunk);

        if !chunk.contains(&b'\n') {
            return;
        }

        let Some(last_newline) = pending.iter().rposition(|&b| b == b'\n') else {
            return;
        };
        let complete: Vec<u8> = pending.drain(..=last_newline).collect();

        for line in complete[..complete.len() - 1].split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            (self.sink)(&String::from_utf8_lossy(line));
        }
    }

    /// Number of buffered bytes that do not yet form a complete line.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("log buffer mutex poisoned").len()
    }
}

/// One [`LineBuffer`] per daemon output stream.
///
/// Bytes left without a terminator when the bridge is dropped are discarded.
pub struct LogBridge {
    stdout: LineBuffer,
    stderr: LineBuffer,
}

impl LogBridge {
    pub fn new(stdout: LineSink, stderr: LineSink) -> Self {
        Self { stdout: LineBuffer::new(stdout), stderr: LineBuffer::new(stderr) }
    }

    /// Bridge that forwards stdout at debug level and stderr at info level.
    pub fn tracing() -> Self {
        Self::new(
            Arc::new(|line: &str| tracing::debug!(target: DAEMON_LOG_TARGET, "{line}")),
            Arc::new(|line: &str| tracing::info!(target: DAEMON_LOG_TARGET, "{line}")),
        )
    }

    pub fn buffer(&self, stream: DaemonStream) -> &LineBuffer {
        match stream {
            DaemonStream::Stdout => &self.stdout,
            DaemonStream::Stderr => &self.stderr,
        }
    }

    pub fn push(&self, stream: DaemonStream, chunk: &[u8]) {
        self.buffer(stream).push(chunk);
    }

    /// Feed bytes appended to `path` after `offset` into `stream`.
    ///
    /// The task polls the file until it is aborted, the runtime shuts down
    /// or a read fails. Dropping it never affects the writer of the file.
    pub fn follow(self: &Arc<Self>, path: PathBuf, offset: u64, stream: DaemonStream) -> JoinHandle<()> {
        let bridge = Arc::clone(self);
        tokio::spawn(async move {
            let mut file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!("Cannot follow {}: {e}", path.display());
                    return;
                }
            };
            if let Err(e) = file.seek(SeekFrom::Start(offset)).await {
                tracing::debug!("Cannot seek in {}: {e}", path.display());
                return;
            }

            let mut chunk = vec![0u8; FOLLOW_CHUNK_SIZE];
            loop {
                match file.read(&mut chunk).await {
                    Ok(0) => tokio::time::sleep(FOLLOW_INTERVAL).await,
                    Ok(n) => bridge.push(stream, &chunk[..n]),
                    Err(e) => {
                        tracing::debug!("Stopped following daemon {stream:?}: {e}");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for LogBridge {
    fn default() -> Self {
        Self::tracing()
    }
}
