//! Member cache
//!
//! Last-known member record per `(guild, user)`. Entries are only ever
//! refined by newer data through the non-null merge rule. The cache lives as
//! long as the authenticated session and is not evicted or bounded; it is
//! cleared on logout and on authentication failure.

use chat_core::{GuildMember, MemberPatch, Snowflake};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Thread-safe member store
///
/// Readers get clones; only the subscription manager writes.
#[derive(Debug, Default)]
pub struct MemberCache {
    members: DashMap<(Snowflake, Snowflake), GuildMember>,
}

impl MemberCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<GuildMember> {
        self.members
            .get(&(guild_id, user_id))
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, guild_id: Snowflake, user_id: Snowflake) -> bool {
        self.members.contains_key(&(guild_id, user_id))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of cached members of one guild
    pub fn guild_len(&self, guild_id: Snowflake) -> usize {
        self.members
            .iter()
            .filter(|entry| entry.key().0 == guild_id)
            .count()
    }

    /// Insert a member or fold it into the existing record
    pub(crate) fn upsert(&self, member: GuildMember) {
        match self.members.entry((member.guild_id, member.user_id())) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(member),
            Entry::Vacant(entry) => {
                entry.insert(member);
            }
        }
    }

    /// Patch a known member; unknown members are not inserted
    pub(crate) fn apply_update(
        &self,
        guild_id: Snowflake,
        user_id: Snowflake,
        patch: MemberPatch,
    ) -> bool {
        match self.members.get_mut(&(guild_id, user_id)) {
            Some(mut entry) => {
                entry.apply(patch);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        self.members.clear();
    }
}
