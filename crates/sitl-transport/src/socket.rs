//! [`SocketTransport`] – TCP client for the simulator link.
//!
//! The transport owns at most one live connection.  Only
//! [`connect`][SocketTransport::connect] blocks; once connected the socket is
//! non-blocking and every read is a single receive attempt.
//!
//! Failures never terminate anything.  Each state change is queued as a
//! [`LinkEvent`] that the owner drains with
//! [`take_event`][SocketTransport::take_event] and acts on.
//!
//! # Example
//!
//! ```no_run
//! use sitl_transport::SocketTransport;
//!
//! let mut link = SocketTransport::new();
//! link.connect("127.0.0.1", 5555)?;
//! link.write(b"hello")?;
//!
//! let mut buf = [0u8; 64];
//! let n = link.read(&mut buf)?; // Ok(0) when nothing has arrived yet
//! # let _ = n;
//! # Ok::<(), sitl_types::SitlError>(())
//! ```

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use sitl_types::{FailureReason, LinkEvent, LinkState, SitlError};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::retry::RetryPolicy;

/// Upper bound reported by [`SocketTransport::available`].
pub const AVAILABLE_PEEK_LEN: usize = 4096;

struct Connection {
    stream: TcpStream,
    host: String,
    port: u16,
}

/// Raw byte transport over one outbound TCP connection.
pub struct SocketTransport {
    conn: Option<Connection>,
    state: LinkState,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    events: VecDeque<LinkEvent>,
}

impl Default for SocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SocketTransport {
    /// An unconnected transport using the system clock and the default
    /// (unbounded) retry policy.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: None,
            state: LinkState::Disconnected,
            policy: RetryPolicy::default(),
            clock,
            events: VecDeque::new(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    /// Swap the clock used for retry and stall timing.  The connection and
    /// queued events are kept.
    pub fn set_clock(&mut self, clock: Arc<dyn Clock>) {
        self.clock = clock;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Host and port of the live connection, if any.
    pub fn peer(&self) -> Option<(&str, u16)> {
        self.conn.as_ref().map(|c| (c.host.as_str(), c.port))
    }

    /// Pop the oldest queued [`LinkEvent`].
    pub fn take_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    /// Connect to the simulator at `host:port`.
    ///
    /// Any existing connection is torn down first.  While the simulator
    /// refuses the handshake the call sleeps [`RetryPolicy::interval`] and
    /// retries, within the policy's attempt and deadline bounds.
    ///
    /// # Errors
    ///
    /// - [`SitlError::Resolve`] when `host` does not resolve.
    /// - [`SitlError::Connect`] for any handshake error other than refusal.
    /// - [`SitlError::RetriesExhausted`] when the retry bound is reached.
    /// - [`SitlError::NonBlocking`] when the socket mode cannot be switched.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), SitlError> {
        if self.conn.is_some() {
            self.disconnect();
        }

        let addrs = match resolve(host, port) {
            Ok(addrs) => addrs,
            Err(err) => return Err(self.fail_connect(err)),
        };

        self.state = LinkState::Connecting;
        info!(host, port, "connecting to simulator");

        let stream = match self.handshake(host, port, &addrs) {
            Ok(stream) => stream,
            Err(err) => return Err(self.fail_connect(err)),
        };
        if let Err(e) = stream.set_nonblocking(true) {
            return Err(self.fail_connect(SitlError::NonBlocking(e)));
        }

        self.conn = Some(Connection {
            stream,
            host: host.to_string(),
            port,
        });
        self.state = LinkState::Connected;
        self.events.push_back(LinkEvent::Connected {
            host: host.to_string(),
            port,
        });
        info!(host, port, "connected to simulator");
        Ok(())
    }

    /// Send all of `bytes`.
    ///
    /// "Would block" is retried after [`RetryPolicy::write_backoff`] until
    /// [`RetryPolicy::write_timeout`] expires.  Any other send error, or the
    /// timeout, disconnects the transport.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, SitlError> {
        if self.conn.is_none() {
            return Err(SitlError::NotConnected);
        }

        let mut sent = 0;
        let mut blocked_since: Option<Duration> = None;
        while sent < bytes.len() {
            let Some(conn) = self.conn.as_mut() else {
                return Err(SitlError::NotConnected);
            };
            match conn.stream.write(&bytes[sent..]) {
                Ok(0) => {
                    let err = io::Error::from(ErrorKind::WriteZero);
                    return Err(self.lose(SitlError::Send(err)));
                }
                Ok(n) => {
                    sent += n;
                    blocked_since = None;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let now = self.clock.now();
                    let waited = now.saturating_sub(*blocked_since.get_or_insert(now));
                    if !self.policy.write_within_budget(waited) {
                        let waited_ms = waited.as_millis() as u64;
                        return Err(self.lose(SitlError::SendStalled { waited_ms }));
                    }
                    self.clock.sleep(self.policy.write_backoff);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(self.lose(SitlError::Send(e))),
            }
        }
        Ok(sent)
    }

    /// One non-blocking receive attempt into `buf`.
    ///
    /// Returns `Ok(0)` when no data is currently available.  A zero-length
    /// receive means the simulator closed the connection: the transport
    /// disconnects and returns [`SitlError::PeerClosed`].
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, SitlError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SitlError::NotConnected);
        };
        if buf.is_empty() {
            return Ok(0);
        }
        match conn.stream.read(buf) {
            Ok(0) => Err(self.lose(SitlError::PeerClosed)),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(self.lose(SitlError::Receive(e))),
        }
    }

    /// Best-effort count of bytes waiting in the socket receive queue,
    /// capped at [`AVAILABLE_PEEK_LEN`].  Zero when unconnected.
    pub fn available(&self) -> usize {
        let Some(conn) = self.conn.as_ref() else {
            return 0;
        };
        let mut scratch = [0u8; AVAILABLE_PEEK_LEN];
        conn.stream.peek(&mut scratch).unwrap_or(0)
    }

    /// Close the connection.  Idempotent.
    ///
    /// A link that already failed keeps its [`LinkState::Failed`] reason.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.stream.shutdown(Shutdown::Both);
            self.state = LinkState::Disconnected;
            self.events.push_back(LinkEvent::Disconnected);
            info!(host = %conn.host, port = conn.port, "disconnected from simulator");
        }
    }

    // ── internal ─────────────────────────────────────────────────────────────

    fn handshake(
        &self,
        host: &str,
        port: u16,
        addrs: &[SocketAddr],
    ) -> Result<TcpStream, SitlError> {
        let started = self.clock.now();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match TcpStream::connect(addrs) {
                Ok(stream) => {
                    debug!(attempts, "handshake complete");
                    return Ok(stream);
                }
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    let elapsed = self.clock.now().saturating_sub(started);
                    if !self.policy.should_retry(attempts, elapsed) {
                        return Err(SitlError::RetriesExhausted {
                            addr: format!("{host}:{port}"),
                            attempts,
                        });
                    }
                    debug!(host, port, attempt = attempts, "simulator not listening yet; retrying");
                    self.clock.sleep(self.policy.interval);
                }
                Err(e) => {
                    return Err(SitlError::Connect {
                        addr: format!("{host}:{port}"),
                        source: e,
                    });
                }
            }
        }
    }

    fn fail_connect(&mut self, err: SitlError) -> SitlError {
        let reason = err.failure_reason().unwrap_or(FailureReason::ConnectError);
        self.state = LinkState::Failed(reason);
        self.events.push_back(LinkEvent::ConnectFailed { reason });
        warn!(error = %err, "simulator connect failed");
        err
    }

    fn lose(&mut self, err: SitlError) -> SitlError {
        let reason = err.failure_reason().unwrap_or(FailureReason::ReceiveError);
        if let Some(conn) = self.conn.take() {
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        self.state = LinkState::Failed(reason);
        self.events.push_back(LinkEvent::Lost { reason });
        warn!(error = %err, "simulator link lost");
        err
    }
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, SitlError> {
    let resolve_err = |reason: String| SitlError::Resolve {
        host: host.to_string(),
        port,
        reason,
    };
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| resolve_err(e.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(resolve_err("no addresses found".to_string()));
    }
    Ok(addrs)
}
