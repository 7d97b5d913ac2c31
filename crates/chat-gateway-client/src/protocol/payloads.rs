//! Control payload definitions
//!
//! Payloads of the non-dispatch envelopes: what the client sends to open,
//! resume and shape its session, plus the server's Hello.

use std::collections::BTreeMap;

use bitflags::bitflags;
use chat_core::Snowflake;
use serde::{Deserialize, Serialize};

use crate::subscription::MemberRange;

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Interval the reference gateway announces (41.25 seconds)
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 41_250;

    /// Create a Hello payload with custom interval
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::with_interval(Self::DEFAULT_HEARTBEAT_INTERVAL)
    }
}

bitflags! {
    /// Feature flags announced in Identify
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const LAZY_USER_NOTES = 1 << 0;
        const VERSIONED_READ_STATES = 1 << 2;
        const DEDUPE_USER_OBJECTS = 1 << 4;
        const PRIORITIZED_READY_PAYLOAD = 1 << 5;
        const CLIENT_STATE_V2 = 1 << 10;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::LAZY_USER_NOTES | Self::DEDUPE_USER_OBJECTS | Self::CLIENT_STATE_V2
    }
}

/// Payload for op 2 (Identify)
///
/// Sent by the client to open a fresh session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Account token
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Raw `Capabilities` bits
    #[serde(default)]
    pub capabilities: u32,

    /// Per-payload compression; unused since transport compression is requested in the URL
    #[serde(default)]
    pub compress: bool,
}

impl IdentifyPayload {
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        properties: IdentifyProperties,
        capabilities: Capabilities,
        compress: bool,
    ) -> Self {
        Self {
            token: token.into(),
            properties,
            capabilities: capabilities.bits(),
            compress,
        }
    }

    /// Announced capabilities; unknown bits are kept
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::from_bits_retain(self.capabilities)
    }
}

/// Client connection properties
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl From<&chat_common::ClientProperties> for IdentifyProperties {
    fn from(props: &chat_common::ClientProperties) -> Self {
        Self {
            os: props.os.clone(),
            browser: props.browser.clone(),
            device: props.device.clone(),
        }
    }
}

/// Payload for op 6 (Resume)
///
/// Sent by the client to resume a disconnected session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Account token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    pub guild_id: Snowflake,
    pub user_ids: Vec<Snowflake>,
    #[serde(default)]
    pub presences: bool,
    /// Echoed in every GUILD_MEMBERS_CHUNK answering this request
    pub nonce: String,
}

/// Payload for op 14 (Guild Subscribe)
///
/// Every field except `guild_id` is optional; the server merges what is sent
/// into the guild's existing subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSubscribePayload {
    pub guild_id: Snowflake,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activities: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<bool>,

    /// Guild-wide member index ranges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranges: Option<Vec<MemberRange>>,

    /// Member-list index ranges per channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<BTreeMap<Snowflake, Vec<MemberRange>>>,
}

impl GuildSubscribePayload {
    #[must_use]
    pub fn new(guild_id: Snowflake) -> Self {
        Self {
            guild_id,
            ..Self::default()
        }
    }
}

/// Payload for op 13 (DM Subscribe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmSubscribePayload {
    pub channel_id: Snowflake,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_payload() {
        let hello = HelloPayload::default();
        assert_eq!(hello.heartbeat_interval, 41_250);

        let custom = HelloPayload::with_interval(30_000);
        assert_eq!(custom.heartbeat_interval, 30_000);
    }

    #[test]
    fn test_identify_payload_serialization() {
        let payload = IdentifyPayload::new(
            "token123",
            IdentifyProperties {
                os: "linux".to_string(),
                browser: "chat-gateway-client".to_string(),
                device: String::new(),
            },
            Capabilities::LAZY_USER_NOTES | Capabilities::DEDUPE_USER_OBJECTS,
            true,
        );

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["token"], "token123");
        assert_eq!(json["properties"]["os"], "linux");
        assert_eq!(json["capabilities"], 0b1_0001);
        assert_eq!(json["compress"], true);
    }

    #[test]
    fn test_capabilities_keep_unknown_bits() {
        let payload: IdentifyPayload = serde_json::from_value(serde_json::json!({
            "token": "t",
            "properties": {"os": "", "browser": "", "device": ""},
            "capabilities": (1u32 << 20) | 1,
        }))
        .unwrap();

        let caps = payload.capabilities();
        assert!(caps.contains(Capabilities::LAZY_USER_NOTES));
        assert_eq!(caps.bits(), (1 << 20) | 1);
        assert!(!payload.compress);
    }

    #[test]
    fn test_resume_payload_serialization() {
        let payload = ResumePayload {
            token: "token123".to_string(),
            session_id: "session456".to_string(),
            seq: 42,
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["session_id"], "session456");
        assert_eq!(json["seq"], 42);
    }

    #[test]
    fn test_guild_subscribe_omits_unset_fields() {
        let mut payload = GuildSubscribePayload::new(Snowflake::new(10));
        payload.typing = Some(true);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"guild_id": "10", "typing": true}));
    }

    #[test]
    fn test_guild_subscribe_channel_ranges() {
        let mut payload = GuildSubscribePayload::new(Snowflake::new(10));
        let mut channels = BTreeMap::new();
        channels.insert(
            Snowflake::new(20),
            vec![MemberRange::new(0, 99), MemberRange::new(100, 199)],
        );
        payload.channels = Some(channels);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json["channels"]["20"],
            serde_json::json!([[0, 99], [100, 199]])
        );

        let parsed: GuildSubscribePayload = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, payload);
    }
}
