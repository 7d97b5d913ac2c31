//! Gateway message format
//!
//! `GatewayMessage` is the owned, mutable form used to build frames.
//! `GatewayEnvelope` is what the client decodes from the wire: the payload is
//! kept as raw JSON until a typed decoder asks for it.

use super::{
    DmSubscribePayload, GuildSubscribePayload, HelloPayload, IdentifyPayload, OpCode,
    RequestGuildMembersPayload, ResumePayload,
};
use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Gateway message format
///
/// All messages sent over the WebSocket connection follow this format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload
    #[serde(default)]
    pub d: Option<Value>,
}

impl GatewayMessage {
    fn control(op: OpCode, d: Option<Value>) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d,
        }
    }

    // === Client Messages ===

    /// Create a Heartbeat message (op=1); `null` until the first dispatch
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::control(
            OpCode::Heartbeat,
            Some(last_sequence.map_or(Value::Null, |s| Value::Number(s.into()))),
        )
    }

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: &IdentifyPayload) -> Self {
        Self::control(OpCode::Identify, serde_json::to_value(payload).ok())
    }

    /// Create a Resume message (op=6)
    #[must_use]
    pub fn resume(payload: &ResumePayload) -> Self {
        Self::control(OpCode::Resume, serde_json::to_value(payload).ok())
    }

    /// Create a Request Guild Members message (op=8)
    #[must_use]
    pub fn request_guild_members(payload: &RequestGuildMembersPayload) -> Self {
        Self::control(
            OpCode::RequestGuildMembers,
            serde_json::to_value(payload).ok(),
        )
    }

    /// Create a DM Subscribe message (op=13)
    #[must_use]
    pub fn dm_subscribe(payload: DmSubscribePayload) -> Self {
        Self::control(OpCode::DmSubscribe, serde_json::to_value(payload).ok())
    }

    /// Create a Guild Subscribe message (op=14)
    #[must_use]
    pub fn guild_subscribe(payload: &GuildSubscribePayload) -> Self {
        Self::control(OpCode::GuildSubscribe, serde_json::to_value(payload).ok())
    }

    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::control(
            OpCode::Hello,
            serde_json::to_value(HelloPayload::with_interval(heartbeat_interval)).ok(),
        )
    }

    /// Create a Heartbeat ACK message (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::control(OpCode::HeartbeatAck, None)
    }

    /// Create a Reconnect message (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::control(OpCode::Reconnect, None)
    }

    /// Create an Invalid Session message (op=9)
    ///
    /// `resumable` indicates if the session can be resumed.
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::control(OpCode::InvalidSession, Some(Value::Bool(resumable)))
    }

    /// Server-side heartbeat request (op=1 with no payload)
    #[must_use]
    pub fn heartbeat_request() -> Self {
        Self::control(OpCode::Heartbeat, None)
    }

    // === Parsing Client Messages ===

    fn payload_as<T: DeserializeOwned>(&self, op: OpCode) -> Option<T> {
        if self.op != op {
            return None;
        }
        self.d.as_ref().and_then(|d| T::deserialize(d).ok())
    }

    /// Try to parse as an Identify payload (op=2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        self.payload_as(OpCode::Identify)
    }

    /// Try to parse as a Resume payload (op=6)
    pub fn as_resume(&self) -> Option<ResumePayload> {
        self.payload_as(OpCode::Resume)
    }

    /// Try to parse as a Request Guild Members payload (op=8)
    pub fn as_request_guild_members(&self) -> Option<RequestGuildMembersPayload> {
        self.payload_as(OpCode::RequestGuildMembers)
    }

    /// Try to parse as a Guild Subscribe payload (op=14)
    pub fn as_guild_subscribe(&self) -> Option<GuildSubscribePayload> {
        self.payload_as(OpCode::GuildSubscribe)
    }

    /// Try to parse as a DM Subscribe payload (op=13)
    pub fn as_dm_subscribe(&self) -> Option<DmSubscribePayload> {
        self.payload_as(OpCode::DmSubscribe)
    }

    /// Try to parse the heartbeat sequence number (op=1)
    pub fn as_heartbeat_seq(&self) -> Option<Option<u64>> {
        if self.op != OpCode::Heartbeat {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_u64))
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}

/// Decoded inbound envelope
///
/// Immutable once decoded. The payload stays as unparsed JSON so that the
/// dispatch decoder can pick the target type from the event name.
#[derive(Debug, Deserialize)]
pub struct GatewayEnvelope {
    op: OpCode,
    #[serde(default)]
    t: Option<String>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    d: Option<Box<RawValue>>,
}

impl GatewayEnvelope {
    /// Decode an envelope from JSON text
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        serde_json::from_str(json).map_err(|e| CodecError::InvalidEnvelope(e.to_string()))
    }

    /// Decode an envelope from JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::InvalidEnvelope(e.to_string()))
    }

    #[inline]
    pub fn op(&self) -> OpCode {
        self.op
    }

    /// Event name, set on dispatches only
    #[inline]
    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }

    /// Sequence number, set on dispatches only
    #[inline]
    pub fn sequence(&self) -> Option<u64> {
        self.s
    }

    /// Raw payload text; `None` when `d` was absent
    pub fn raw_payload(&self) -> Option<&str> {
        self.d.as_deref().map(RawValue::get)
    }

    /// Decode the payload into `T`; an absent `d` decodes as JSON `null`
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        let raw = self.raw_payload().unwrap_or("null");
        serde_json::from_str(raw).map_err(|e| {
            CodecError::payload(self.event_name().unwrap_or(self.op.name()), &e)
        })
    }
}
