//! Typed dispatch events
//!
//! Every dispatch envelope is decoded exactly once, by event name, into one
//! variant of [`DispatchEvent`].

use serde::de::DeserializeOwned;

use super::{
    GatewayEventType, GuildMemberListUpdateEvent, GuildMemberUpdateEvent, GuildMembersChunkEvent,
    MessageCreateEvent, MessageDeleteEvent, MessageUpdateEvent, PresenceUpdateEvent, ReadyEvent,
    TypingStartEvent,
};
use crate::error::CodecError;
use crate::protocol::GatewayEnvelope;

/// Delivery path an event is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    TypingStart,
    PresenceUpdate,
    MemberListUpdate,
    GuildMemberChunk,
}

impl Topic {
    /// Every routed topic, in index order
    pub const ALL: [Topic; 7] = [
        Topic::MessageCreate,
        Topic::MessageUpdate,
        Topic::MessageDelete,
        Topic::TypingStart,
        Topic::PresenceUpdate,
        Topic::MemberListUpdate,
        Topic::GuildMemberChunk,
    ];

    /// Dense index, usable for per-topic arrays
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MessageCreate => "message-create",
            Self::MessageUpdate => "message-update",
            Self::MessageDelete => "message-delete",
            Self::TypingStart => "typing-start",
            Self::PresenceUpdate => "presence-update",
            Self::MemberListUpdate => "member-list-update",
            Self::GuildMemberChunk => "guild-member-chunk",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded dispatch event
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    Ready(Box<ReadyEvent>),
    Resumed,
    MessageCreate(Box<MessageCreateEvent>),
    MessageUpdate(MessageUpdateEvent),
    MessageDelete(MessageDeleteEvent),
    TypingStart(TypingStartEvent),
    PresenceUpdate(PresenceUpdateEvent),
    GuildMemberListUpdate(GuildMemberListUpdateEvent),
    GuildMembersChunk(GuildMembersChunkEvent),
    GuildMemberUpdate(GuildMemberUpdateEvent),
    /// Event name this client does not handle; never routed
    Unknown { name: String },
}

impl DispatchEvent {
    /// Decode the payload of a dispatch envelope
    pub fn decode(envelope: &GatewayEnvelope) -> Result<Self, CodecError> {
        let name = envelope.event_name().ok_or_else(|| {
            CodecError::InvalidEnvelope("dispatch without event name".to_string())
        })?;
        let Some(kind) = GatewayEventType::from_str(name) else {
            return Ok(Self::Unknown {
                name: name.to_string(),
            });
        };

        Ok(match kind {
            GatewayEventType::Ready => Self::Ready(Box::new(payload(envelope)?)),
            GatewayEventType::Resumed => Self::Resumed,
            GatewayEventType::MessageCreate => Self::MessageCreate(Box::new(payload(envelope)?)),
            GatewayEventType::MessageUpdate => Self::MessageUpdate(payload(envelope)?),
            GatewayEventType::MessageDelete => Self::MessageDelete(payload(envelope)?),
            GatewayEventType::TypingStart => Self::TypingStart(payload(envelope)?),
            GatewayEventType::PresenceUpdate => Self::PresenceUpdate(payload(envelope)?),
            GatewayEventType::GuildMemberListUpdate => {
                Self::GuildMemberListUpdate(payload(envelope)?)
            }
            GatewayEventType::GuildMembersChunk => {
                let mut chunk: GuildMembersChunkEvent = payload(envelope)?;
                // members in a chunk omit guild_id
                for member in &mut chunk.members {
                    member.guild_id = chunk.guild_id;
                }
                Self::GuildMembersChunk(chunk)
            }
            GatewayEventType::GuildMemberUpdate => Self::GuildMemberUpdate(payload(envelope)?),
        })
    }

    #[must_use]
    pub fn event_type(&self) -> Option<GatewayEventType> {
        Some(match self {
            Self::Ready(_) => GatewayEventType::Ready,
            Self::Resumed => GatewayEventType::Resumed,
            Self::MessageCreate(_) => GatewayEventType::MessageCreate,
            Self::MessageUpdate(_) => GatewayEventType::MessageUpdate,
            Self::MessageDelete(_) => GatewayEventType::MessageDelete,
            Self::TypingStart(_) => GatewayEventType::TypingStart,
            Self::PresenceUpdate(_) => GatewayEventType::PresenceUpdate,
            Self::GuildMemberListUpdate(_) => GatewayEventType::GuildMemberListUpdate,
            Self::GuildMembersChunk(_) => GatewayEventType::GuildMembersChunk,
            Self::GuildMemberUpdate(_) => GatewayEventType::GuildMemberUpdate,
            Self::Unknown { .. } => return None,
        })
    }

    /// Topic this event is delivered on; `None` for session-internal events
    #[must_use]
    pub fn topic(&self) -> Option<Topic> {
        match self {
            Self::MessageCreate(_) => Some(Topic::MessageCreate),
            Self::MessageUpdate(_) => Some(Topic::MessageUpdate),
            Self::MessageDelete(_) => Some(Topic::MessageDelete),
            Self::TypingStart(_) => Some(Topic::TypingStart),
            Self::PresenceUpdate(_) => Some(Topic::PresenceUpdate),
            Self::GuildMemberListUpdate(_) => Some(Topic::MemberListUpdate),
            Self::GuildMembersChunk(_) => Some(Topic::GuildMemberChunk),
            Self::Ready(_) | Self::Resumed | Self::GuildMemberUpdate(_) | Self::Unknown { .. } => {
                None
            }
        }
    }
}

fn payload<T: DeserializeOwned>(envelope: &GatewayEnvelope) -> Result<T, CodecError> {
    envelope.payload()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::Snowflake;

    fn envelope(t: &str, d: &str) -> GatewayEnvelope {
        GatewayEnvelope::from_json(&format!(r#"{{"op":0,"t":"{t}","s":1,"d":{d}}}"#)).unwrap()
    }

    #[test]
    fn test_topic_indices_are_dense() {
        for (i, topic) in Topic::ALL.iter().enumerate() {
            assert_eq!(topic.index(), i);
        }
    }

    #[test]
    fn test_decode_message_delete() {
        let event =
            DispatchEvent::decode(&envelope("MESSAGE_DELETE", r#"{"id":"5","channel_id":"6"}"#))
                .unwrap();
        assert_eq!(event.topic(), Some(Topic::MessageDelete));
        match event {
            DispatchEvent::MessageDelete(delete) => assert_eq!(delete.id, Snowflake::from(5i64)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = DispatchEvent::decode(&envelope("MESSAGE_UPDATE", r#"{"content":7}"#))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidPayload { ref event, .. } if event == "MESSAGE_UPDATE"));
    }

    #[test]
    fn test_decode_unknown_event() {
        let event = DispatchEvent::decode(&envelope("CHANNEL_PINS_UPDATE", "{}")).unwrap();
        assert!(matches!(event, DispatchEvent::Unknown { ref name } if name == "CHANNEL_PINS_UPDATE"));
        assert_eq!(event.topic(), None);
        assert_eq!(event.event_type(), None);
    }

    #[test]
    fn test_decode_resumed_ignores_payload() {
        let event = DispatchEvent::decode(&envelope("RESUMED", "null")).unwrap();
        assert!(matches!(event, DispatchEvent::Resumed));
        assert_eq!(event.topic(), None);
    }

    #[test]
    fn test_chunk_members_get_guild_id() {
        let event = DispatchEvent::decode(&envelope(
            "GUILD_MEMBERS_CHUNK",
            r#"{"guild_id":"42","chunk_index":0,"chunk_count":1,
                "members":[{"user":{"id":"1","username":"a"},"roles":[]}]}"#,
        ))
        .unwrap();

        match event {
            DispatchEvent::GuildMembersChunk(chunk) => {
                assert_eq!(chunk.members[0].guild_id, Snowflake::from(42i64));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_without_name() {
        let env = GatewayEnvelope::from_json(r#"{"op":0,"s":3,"d":{}}"#).unwrap();
        assert!(matches!(
            DispatchEvent::decode(&env),
            Err(CodecError::InvalidEnvelope(_))
        ));
    }
}
