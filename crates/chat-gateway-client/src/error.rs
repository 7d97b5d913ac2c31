//! Client error types

use crate::protocol::CloseCode;
use thiserror::Error;

/// Errors raised while turning frames into envelopes and payloads
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Frame is not a valid JSON envelope
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Envelope is valid but its payload does not match the expected shape
    #[error("Invalid {event} payload: {reason}")]
    InvalidPayload { event: String, reason: String },

    /// zlib-stream inflate failed
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Outbound envelope could not be serialized
    #[error("Encode failed: {0}")]
    Encode(String),
}

impl CodecError {
    pub(crate) fn payload(event: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            reason: err.to_string(),
        }
    }
}

/// Errors raised by a transport implementation
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Invalid gateway URL: {0}")]
    InvalidUrl(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed")]
    Closed,
}

/// Error type surfaced by the gateway client
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Operation needs a live session and the client is not Ready
    #[error("Gateway is not ready")]
    NotReady,

    /// The client was closed by its owner
    #[error("Gateway client closed")]
    Closed,

    /// `connect` was called while a supervisor is already running
    #[error("Gateway client is already connected")]
    AlreadyConnected,

    /// A connect attempt did not receive Hello in time
    #[error("Timed out waiting for the gateway")]
    ConnectTimeout,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The server rejected the token; never retried
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(CloseCode),

    /// The server closed with a code that forbids reconnecting
    #[error("Gateway closed the connection: {0}")]
    FatalClose(CloseCode),

    /// Reconnect budget spent without reaching Ready
    #[error("Gave up after {attempts} reconnect attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Too many frames are already waiting for the socket
    #[error("Outbound queue is full")]
    OutboundFull,

    /// A pending member request was dropped because the session left Ready
    #[error("Request invalidated by reconnect")]
    RequestInvalidated,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Errors that end the supervisor and are reported to the owner
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_)
                | Self::FatalClose(_)
                | Self::RetriesExhausted { .. }
                | Self::Config(_)
        )
    }

    /// Errors the supervisor handles internally with a reconnect
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectTimeout | Self::Codec(CodecError::Decompress(_))
        )
    }
}

/// Result alias for gateway client operations
pub type GatewayResult<T> = Result<T, GatewayError>;
