//! Entities received from the gateway

mod member;
mod user;

pub use member::{GuildMember, MemberPatch};
pub use user::User;
