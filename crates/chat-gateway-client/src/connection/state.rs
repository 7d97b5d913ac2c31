//! Connection lifecycle state

use serde::{Deserialize, Serialize};

/// Connection state
///
/// Owned and written by the supervisor only; everyone else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No socket, no supervisor task
    #[default]
    Disconnected,
    /// Opening the socket
    Connecting,
    /// Socket open, waiting for Hello
    AwaitingHello,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// Session established
    Ready,
    /// Connection lost; backing off before the next attempt
    Reconnecting,
    /// Shutting down; never left except to Disconnected
    Closing,
}

impl ConnectionState {
    /// Whether the supervisor may move from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{
            AwaitingHello, Closing, Connecting, Disconnected, Identifying, Ready, Reconnecting,
            Resuming,
        };
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, AwaitingHello | Reconnecting | Closing)
                | (AwaitingHello, Identifying | Resuming | Reconnecting | Closing)
                | (Identifying | Resuming, Ready | Reconnecting | Closing)
                | (Ready, Reconnecting | Closing)
                | (Reconnecting, Connecting | Closing)
                | (Closing, Disconnected)
        )
    }

    /// A socket is open and the handshake has at least started
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Identifying | Self::Resuming | Self::Ready)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::AwaitingHello => "AwaitingHello",
            Self::Identifying => "Identifying",
            Self::Resuming => "Resuming",
            Self::Ready => "Ready",
            Self::Reconnecting => "Reconnecting",
            Self::Closing => "Closing",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
