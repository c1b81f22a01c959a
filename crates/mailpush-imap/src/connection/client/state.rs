//! Connection lifecycle states.

use std::fmt;

/// Where a [`Connection`](super::Connection) is in its lifecycle.
///
/// States only move forward. `Closed` is terminal: a closed connection is
/// never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// No socket yet.
    Unconnected,
    /// Socket open, greeting read.
    Connected,
    /// Capabilities of the server are known.
    CapabilityKnown,
    /// STARTTLS completed.
    TlsNegotiated,
    /// Credentials accepted.
    Authenticated,
    /// COMPRESS=DEFLATE active.
    CompressionEnabled,
    /// Open and usable for commands.
    Ready,
    /// Closed for good.
    Closed,
}

impl ConnectionState {
    /// Returns true while a socket is held.
    #[must_use]
    pub const fn is_open(self) -> bool {
        !matches!(self, Self::Unconnected | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Connected => "connected",
            Self::CapabilityKnown => "capability-known",
            Self::TlsNegotiated => "tls-negotiated",
            Self::Authenticated => "authenticated",
            Self::CompressionEnabled => "compression-enabled",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
