//! Bounded retry loop for opening the BSP transport socket.
//!
//! The daemon creates the socket asynchronously after it receives the `bsp`
//! control request, so the first few attempts usually find nothing listening.
//! Those attempts are retried on a fixed period until a deadline; every other
//! failure is returned immediately.

use anyhow::Result;
use std::io;
use std::time::{Duration, Instant};

use crate::utils::error::BridgeError;

/// Whether the retry loop has run out of time.
pub fn deadline_passed(now: Instant, deadline: Instant) -> bool {
    now >= deadline
}

/// Errors meaning "nobody is listening yet" rather than a real failure.
///
/// `NotFound` shows up for domain sockets the daemon has not created yet.
pub fn is_not_listening(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound)
}

/// Call `open` until it succeeds, sleeping `period` between refused attempts.
///
/// Fails with [`BridgeError::ConnectionTimeout`] once an attempt is refused at
/// or after `now + timeout`. This blocks the calling thread; run it through
/// `tokio::task::spawn_blocking` from async code.
pub fn connect_with_retry<T, F>(
    mut open: F,
    period: Duration,
    timeout: Duration,
    address: &str,
) -> Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 1;

    loop {
        match open() {
            Ok(transport) => {
                tracing::debug!("Connected to {address} on attempt {attempt}");
                return Ok(transport);
            }
            Err(e) if is_not_listening(&e) => {
                if deadline_passed(Instant::now(), deadline) {
                    tracing::debug!("Giving up on {address} after {attempt} attempts");
                    return Err(BridgeError::ConnectionTimeout {
                        address: address.to_string(),
                        timeout,
                    }
                    .into());
                }
                tracing::trace!("Attempt {attempt} to reach {address} refused: {e}");
                std::thread::sleep(period);
                attempt += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("Failed to connect to {address}")));
            }
        }
    }
}

#[cfg(unix)]
pub fn connect_unix(
    path: &std::path::Path,
    period: Duration,
    timeout: Duration,
) -> Result<std::os::unix::net::UnixStream> {
    let address = path.display().to_string();
    connect_with_retry(|| std::os::unix::net::UnixStream::connect(path), period, timeout, &address)
}
