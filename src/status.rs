//! Connection status — the per-role lifecycle state machines.

use std::fmt;

/// The lifecycle state of a [`crate::Server`] or [`crate::Client`] peer.
///
/// Not every role passes through every variant — see `src/server.rs` and
/// `src/client.rs` for the two transition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Created but not yet started.
    NotConnected,
    /// Server only: bound and accepting.
    Listening,
    /// Client only: dialing for the first time.
    Connecting,
    /// Handshake complete, frames flow.
    Connected,
    /// A prior connection dropped; a new one is being (re-)established.
    ReConnecting,
    /// The active connection dropped and no new one has arrived yet.
    Disconnected,
    /// `close()` was called; teardown is in progress.
    Closing,
    /// Teardown complete; channels are drained and will yield no more items.
    Closed,
    /// Gave up waiting to (re)connect within the configured timeout.
    Timeout,
    /// An unrecoverable, non-peer-drop failure occurred (e.g. bind failed).
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotConnected => "not connected",
            Self::Listening => "listening",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReConnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Timeout => "timeout",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

impl Status {
    /// Whether frames may be written in this state.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the peer has finished tearing down and will never reconnect.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Timeout | Self::Error)
    }
}
