use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a link ended up in [`LinkState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The simulator host name did not resolve to any address.
    Unresolvable,
    /// The handshake failed with an error other than "connection refused".
    ConnectError,
    /// The simulator kept refusing until the retry bound was reached.
    RetriesExhausted,
    /// The connected socket could not be switched to non-blocking mode.
    NonBlockingUnsupported,
    /// A send failed, or stayed blocked past the write timeout.
    SendError,
    /// A receive failed with an error other than "would block".
    ReceiveError,
    /// The simulator closed its end of the connection.
    PeerClosed,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureReason::Unresolvable => "host unresolvable",
            FailureReason::ConnectError => "connect error",
            FailureReason::RetriesExhausted => "connect retries exhausted",
            FailureReason::NonBlockingUnsupported => "non-blocking mode unavailable",
            FailureReason::SendError => "send error",
            FailureReason::ReceiveError => "receive error",
            FailureReason::PeerClosed => "closed by simulator",
        };
        f.write_str(label)
    }
}

/// Connection state of a simulator link.
///
/// `Disconnected` covers both "never connected" and "closed on request";
/// a link that was lost or never came up carries the reason in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    /// Only observable from inside the connect retry loop.
    Connecting,
    Connected,
    Failed(FailureReason),
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

/// Externally visible link transitions, queued by the transport and drained
/// by whoever owns program lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LinkEvent {
    /// A handshake completed and the socket is ready for I/O.
    Connected { host: String, port: u16 },
    /// `connect` gave up without ever reaching `Connected`.
    ConnectFailed { reason: FailureReason },
    /// A live connection was torn down by the peer or by an I/O error.
    Lost { reason: FailureReason },
    /// A live connection was closed on request.
    Disconnected,
}

/// Errors reported by the SITL transport layer.
#[derive(Error, Debug)]
pub enum SitlError {
    #[error("failed to resolve simulator address {host}:{port}: {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("connection to {addr} failed: {source}")]
    Connect { addr: String, source: io::Error },

    #[error("simulator at {addr} still refusing after {attempts} attempt(s)")]
    RetriesExhausted { addr: String, attempts: u32 },

    #[error("failed to set non-blocking mode: {0}")]
    NonBlocking(#[source] io::Error),

    #[error("not connected to a simulator")]
    NotConnected,

    #[error("send error: {0}")]
    Send(#[source] io::Error),

    #[error("send stalled: socket would block for {waited_ms} ms")]
    SendStalled { waited_ms: u64 },

    #[error("receive error: {0}")]
    Receive(#[source] io::Error),

    #[error("connection closed by simulator")]
    PeerClosed,
}

impl SitlError {
    /// The [`FailureReason`] a link records when this error ends it, or `None`
    /// for errors that leave the link state untouched.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            SitlError::Resolve { .. } => Some(FailureReason::Unresolvable),
            SitlError::Connect { .. } => Some(FailureReason::ConnectError),
            SitlError::RetriesExhausted { .. } => Some(FailureReason::RetriesExhausted),
            SitlError::NonBlocking(_) => Some(FailureReason::NonBlockingUnsupported),
            SitlError::Send(_) | SitlError::SendStalled { .. } => Some(FailureReason::SendError),
            SitlError::Receive(_) => Some(FailureReason::ReceiveError),
            SitlError::PeerClosed => Some(FailureReason::PeerClosed),
            SitlError::NotConnected => None,
        }
    }
}
