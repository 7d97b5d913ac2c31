//! # chat-core
//!
//! Domain layer for the gateway client: snowflake identifiers plus the user and
//! guild member records that the client receives over the gateway and caches.
//! This crate performs no I/O.

pub mod entities;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{GuildMember, MemberPatch, User};
pub use value_objects::{Snowflake, SnowflakeParseError};
