//! Gateway protocol definitions
//!
//! Defines the WebSocket protocol including op codes, message formats, close codes
//! and the frame codec.

mod close_codes;
mod codec;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, CloseDisposition};
pub use codec::Codec;
pub use messages::{GatewayEnvelope, GatewayMessage};
pub use opcodes::OpCode;
pub use payloads::{
    Capabilities, DmSubscribePayload, GuildSubscribePayload, HelloPayload, IdentifyPayload,
    IdentifyProperties, RequestGuildMembersPayload, ResumePayload,
};
