//! Socket transport
//!
//! The supervisor talks to the network only through these traits, so that a
//! scripted transport can stand in for the WebSocket in tests.

mod tungstenite;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;

use crate::error::TransportError;

pub use self::tungstenite::TungsteniteConnector;

/// Close frame contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

/// One WebSocket message as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Peer started the closing handshake
    Close(Option<CloseFrame>),
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a close frame with an application status code
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameStream: Send {
    /// Next data or close frame; `Ok(None)` once the socket is gone
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError>;
}

/// Opens connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;

    /// Network reachability, when the platform can report it
    fn connectivity(&self) -> Option<watch::Receiver<bool>> {
        None
    }
}
