//! Member entity - a user's membership in a guild

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;
use crate::value_objects::Snowflake;

/// Guild member record as delivered in member chunks and member-list syncs.
///
/// `guild_id` is not part of every wire shape; the gateway client fills it in
/// from the enclosing event before the record reaches the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMember {
    #[serde(default)]
    pub guild_id: Snowflake,
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    /// Guild-specific avatar hash
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

/// Partial member data from an update event; `None` means "not sent"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<Snowflake>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl GuildMember {
    /// Create a member with no nickname, roles or guild avatar
    pub fn new(guild_id: Snowflake, user: User) -> Self {
        Self {
            guild_id,
            user,
            nick: None,
            roles: Vec::new(),
            avatar: None,
            joined_at: None,
        }
    }

    /// The user's id, which together with `guild_id` keys the record
    #[inline]
    pub fn user_id(&self) -> Snowflake {
        self.user.id
    }

    /// Get display name (nickname if set, otherwise the user's display name)
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or_else(|| self.user.display_name())
    }

    /// Check if member has a specific role
    #[inline]
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.roles.contains(&role_id)
    }

    /// Fold a newer full record for the same member into this one.
    ///
    /// Known values are never replaced by absent ones; roles are always taken
    /// from the newer record since an empty list is meaningful.
    pub fn merge(&mut self, newer: GuildMember) {
        debug_assert_eq!(self.user_id(), newer.user_id());
        self.user.merge(newer.user);
        self.roles = newer.roles;
        if newer.nick.is_some() {
            self.nick = newer.nick;
        }
        if newer.avatar.is_some() {
            self.avatar = newer.avatar;
        }
        if newer.joined_at.is_some() {
            self.joined_at = newer.joined_at;
        }
    }

    /// Apply a partial update; fields the patch does not carry are left alone
    pub fn apply(&mut self, patch: MemberPatch) {
        if let Some(user) = patch.user {
            self.user.merge(user);
        }
        if let Some(roles) = patch.roles {
            self.roles = roles;
        }
        if patch.nick.is_some() {
            self.nick = patch.nick;
        }
        if patch.avatar.is_some() {
            self.avatar = patch.avatar;
        }
    }
}
