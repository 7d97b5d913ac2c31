//! Faults reported by per-connection tasks to the read loop

use crate::error::TransportError;

/// Reason a background task wants the connection torn down
#[derive(Debug, Clone)]
pub(crate) enum Fault {
    /// A heartbeat came due before the previous one was acknowledged
    Zombie,
    /// The socket rejected a write
    WriterFailed(TransportError),
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zombie => f.write_str("heartbeat not acknowledged"),
            Self::WriterFailed(e) => write!(f, "writer failed: {e}"),
        }
    }
}
