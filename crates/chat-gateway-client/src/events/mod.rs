//! Gateway events
//!
//! Defines the dispatch events received from the gateway and the topics they
//! are routed on.

mod dispatch;
mod event_types;
mod payloads;

pub use dispatch::{DispatchEvent, Topic};
pub use event_types::GatewayEventType;
pub use payloads::{
    AttachmentPayload, GuildMemberListUpdateEvent, GuildMemberUpdateEvent, GuildMembersChunkEvent,
    MemberListGroup, MemberListItem, MemberListOp, MessageCreateEvent, MessageDeleteEvent,
    MessageReferencePayload, MessageUpdateEvent, PresenceUpdateEvent, ReadyEvent,
    TypingStartEvent, UnavailableGuild, UserIdPayload,
};
