//! Subscription manager
//!
//! Owns everything the client has asked the server for on the current
//! session: guild range subscriptions, DM subscriptions, member-list views
//! and in-flight member requests. All of it is dropped when the session
//! leaves Ready; callers re-issue interest once readiness returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chat_core::{GuildMember, Snowflake};
use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use super::{MemberRange, RangeSet};
use crate::cache::MemberCache;
use crate::error::{GatewayError, GatewayResult};
use crate::events::{GuildMemberListUpdateEvent, GuildMembersChunkEvent, GuildMemberUpdateEvent};
use crate::protocol::{
    DmSubscribePayload, GatewayMessage, GuildSubscribePayload, RequestGuildMembersPayload,
};
use crate::writer::Outbound;

/// Members answered for one `get_members` call
#[derive(Debug, Clone, Default)]
pub struct MemberBatch {
    pub members: Vec<GuildMember>,
    /// Requested ids the server has no member for
    pub not_found: Vec<Snowflake>,
}

type Reply = oneshot::Sender<GatewayResult<MemberBatch>>;

/// Result of `get_members`: cache hits now, the rest later
#[derive(Debug)]
pub struct MemberLookup {
    /// Members served from the cache without a round trip
    pub cached: Vec<GuildMember>,
    /// Ids that must come from the server
    pub missing: Vec<Snowflake>,
    rx: Option<oneshot::Receiver<GatewayResult<MemberBatch>>>,
}

impl MemberLookup {
    /// Whether everything was served from the cache
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Wait for the missing members and return every member found
    ///
    /// Fails with `RequestInvalidated` if the session drops first.
    pub async fn resolve(self) -> GatewayResult<MemberBatch> {
        let mut batch = MemberBatch {
            members: self.cached,
            not_found: Vec::new(),
        };
        if let Some(rx) = self.rx {
            let fetched = rx.await.map_err(|_| GatewayError::RequestInvalidated)??;
            batch.members.extend(fetched.members);
            batch.not_found = fetched.not_found;
        }
        Ok(batch)
    }
}

/// Caller waiting on some of a guild's pending ids
struct Waiter {
    wanted: HashSet<Snowflake>,
    batch: MemberBatch,
    reply: Reply,
}

impl Waiter {
    fn found(&mut self, member: &GuildMember) {
        if self.wanted.remove(&member.user_id()) {
            self.batch.members.push(member.clone());
        }
    }

    fn not_found(&mut self, user_id: Snowflake) {
        if self.wanted.remove(&user_id) {
            self.batch.not_found.push(user_id);
        }
    }

    fn is_done(&self) -> bool {
        self.wanted.is_empty()
    }
}

/// Outstanding member requests for one guild
struct PendingMemberRequest {
    /// Ids awaiting a chunk, with the nonce of the frame that asked for them
    user_ids: HashMap<Snowflake, String>,
    waiters: Vec<Waiter>,
    created_at: DateTime<Utc>,
}

impl PendingMemberRequest {
    fn new() -> Self {
        Self {
            user_ids: HashMap::new(),
            waiters: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn found(&mut self, member: &GuildMember) {
        self.user_ids.remove(&member.user_id());
        for waiter in &mut self.waiters {
            waiter.found(member);
        }
    }

    fn not_found(&mut self, user_id: Snowflake) {
        self.user_ids.remove(&user_id);
        for waiter in &mut self.waiters {
            waiter.not_found(user_id);
        }
    }

    /// Reply to every waiter whose ids are all answered
    fn complete_waiters(&mut self) {
        let (done, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(Waiter::is_done);
        self.waiters = waiting;
        for waiter in done {
            let _ = waiter.reply.send(Ok(waiter.batch));
        }
    }

    fn is_settled(&self) -> bool {
        self.user_ids.is_empty() && self.waiters.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberListState {
    Requested(Snowflake),
    Populated,
}

#[derive(Default)]
struct Inner {
    /// Writer of the Ready connection; `None` while not Ready
    outbound: Option<Outbound>,
    guilds: HashMap<Snowflake, RangeSet>,
    dms: HashSet<Snowflake>,
    pending: HashMap<Snowflake, PendingMemberRequest>,
    member_lists: HashMap<Snowflake, MemberListState>,
}

impl Inner {
    fn outbound(&self) -> GatewayResult<Outbound> {
        self.outbound.clone().ok_or(GatewayError::NotReady)
    }
}

/// Subscription and member-request bookkeeping
///
/// Every operation runs under one async lock and queues its frames before
/// releasing it, so concurrent duplicate calls observe each other. Queueing
/// never waits on the socket, and state is only recorded once its frame is
/// queued.
pub struct SubscriptionManager {
    cache: Arc<MemberCache>,
    max_ids_per_request: usize,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("max_ids_per_request", &self.max_ids_per_request)
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    pub(crate) fn new(cache: Arc<MemberCache>, max_ids_per_request: usize) -> Self {
        Self {
            cache,
            max_ids_per_request: max_ids_per_request.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Start accepting requests on a Ready connection
    pub(crate) async fn attach(&self, outbound: Outbound) {
        self.inner.lock().await.outbound = Some(outbound);
    }

    /// Forget every subscription and fail every pending member request
    pub(crate) async fn invalidate(&self) {
        let mut inner = self.inner.lock().await;
        inner.outbound = None;
        inner.guilds.clear();
        inner.dms.clear();
        inner.member_lists.clear();

        let pending = std::mem::take(&mut inner.pending);
        for (guild_id, request) in pending {
            tracing::debug!(
                guild_id = %guild_id,
                ids = request.user_ids.len(),
                age_ms = (Utc::now() - request.created_at).num_milliseconds(),
                "Member request invalidated"
            );
            for waiter in request.waiters {
                let _ = waiter.reply.send(Err(GatewayError::RequestInvalidated));
            }
        }
    }

    /// Subscribe to a range of a guild's member list
    ///
    /// Sends one frame with the guild's full merged range set when `range`
    /// adds coverage. Returns whether a frame was sent.
    pub async fn subscribe(&self, guild_id: Snowflake, range: MemberRange) -> GatewayResult<bool> {
        let mut inner = self.inner.lock().await;
        let outbound = inner.outbound()?;

        let mut ranges = inner.guilds.get(&guild_id).cloned().unwrap_or_default();
        if !ranges.insert(range) {
            tracing::debug!(guild_id = %guild_id, range = %range, "Range already subscribed");
            return Ok(false);
        }

        let mut payload = GuildSubscribePayload::new(guild_id);
        payload.typing = Some(true);
        payload.activities = Some(true);
        payload.ranges = Some(ranges.as_slice().to_vec());

        tracing::debug!(guild_id = %guild_id, range = %range, "Subscribing to guild");
        outbound.try_send(GatewayMessage::guild_subscribe(&payload))?;
        inner.guilds.insert(guild_id, ranges);
        Ok(true)
    }

    /// Subscribe to read-state sync for a DM channel
    pub async fn subscribe_to_dm(&self, channel_id: Snowflake) -> GatewayResult<bool> {
        let mut inner = self.inner.lock().await;
        let outbound = inner.outbound()?;
        if inner.dms.contains(&channel_id) {
            return Ok(false);
        }

        tracing::debug!(channel_id = %channel_id, "Subscribing to DM");
        outbound.try_send(GatewayMessage::dm_subscribe(DmSubscribePayload { channel_id }))?;
        inner.dms.insert(channel_id);
        Ok(true)
    }

    /// Look up members, requesting only what neither the cache nor an
    /// in-flight request already covers
    pub async fn get_members(
        &self,
        guild_id: Snowflake,
        user_ids: impl IntoIterator<Item = Snowflake>,
    ) -> GatewayResult<MemberLookup> {
        let mut inner = self.inner.lock().await;

        let mut seen = HashSet::new();
        let mut cached = Vec::new();
        let mut missing = Vec::new();
        for user_id in user_ids {
            if !seen.insert(user_id) {
                continue;
            }
            match self.cache.get(guild_id, user_id) {
                Some(member) => cached.push(member),
                None => missing.push(user_id),
            }
        }
        if missing.is_empty() {
            return Ok(MemberLookup {
                cached,
                missing,
                rx: None,
            });
        }

        let outbound = inner.outbound()?;
        let fresh: Vec<Snowflake> = match inner.pending.get(&guild_id) {
            Some(pending) => missing
                .iter()
                .copied()
                .filter(|id| !pending.user_ids.contains_key(id))
                .collect(),
            None => missing.clone(),
        };

        let requests: Vec<RequestGuildMembersPayload> = fresh
            .chunks(self.max_ids_per_request)
            .map(|ids| RequestGuildMembersPayload {
                guild_id,
                user_ids: ids.to_vec(),
                presences: false,
                nonce: Uuid::new_v4().to_string(),
            })
            .collect();

        tracing::debug!(
            guild_id = %guild_id,
            cached = cached.len(),
            missing = missing.len(),
            requested = fresh.len(),
            frames = requests.len(),
            "Member lookup"
        );
        outbound.try_send_all(
            requests
                .iter()
                .map(GatewayMessage::request_guild_members)
                .collect(),
        )?;

        let pending = inner
            .pending
            .entry(guild_id)
            .or_insert_with(PendingMemberRequest::new);
        for request in requests {
            for id in request.user_ids {
                pending.user_ids.insert(id, request.nonce.clone());
            }
        }
        let (reply, rx) = oneshot::channel();
        pending.waiters.push(Waiter {
            wanted: missing.iter().copied().collect(),
            batch: MemberBatch::default(),
            reply,
        });

        Ok(MemberLookup {
            cached,
            missing,
            rx: Some(rx),
        })
    }

    /// Request the first page of a channel's online member list
    ///
    /// A no-op while a list for that channel is requested or populated.
    pub async fn member_list(&self, channel_id: Snowflake, guild_id: Snowflake) -> GatewayResult<bool> {
        let mut inner = self.inner.lock().await;
        let outbound = inner.outbound()?;
        if inner.member_lists.contains_key(&channel_id) {
            return Ok(false);
        }

        let mut payload = GuildSubscribePayload::new(guild_id);
        payload.typing = Some(true);
        payload.activities = Some(true);
        payload.channels = Some([(channel_id, vec![MemberRange::page(0)])].into());

        tracing::debug!(guild_id = %guild_id, channel_id = %channel_id, "Requesting member list");
        outbound.try_send(GatewayMessage::guild_subscribe(&payload))?;
        inner
            .member_lists
            .insert(channel_id, MemberListState::Requested(guild_id));
        Ok(true)
    }

    pub(crate) async fn handle_members_chunk(&self, chunk: &GuildMembersChunkEvent) {
        let mut inner = self.inner.lock().await;
        for member in &chunk.members {
            self.cache.upsert(member.clone());
        }

        let Some(pending) = inner.pending.get_mut(&chunk.guild_id) else {
            return;
        };
        for member in &chunk.members {
            pending.found(member);
        }
        for user_id in &chunk.not_found {
            pending.not_found(*user_id);
        }
        if chunk.is_last() {
            if let Some(nonce) = &chunk.nonce {
                // ids the final chunk never mentioned do not exist
                let unanswered: Vec<Snowflake> = pending
                    .user_ids
                    .iter()
                    .filter(|(_, n)| *n == nonce)
                    .map(|(id, _)| *id)
                    .collect();
                for user_id in unanswered {
                    pending.not_found(user_id);
                }
            }
        }

        pending.complete_waiters();
        if pending.is_settled() {
            inner.pending.remove(&chunk.guild_id);
        }
    }

    pub(crate) fn handle_member_update(&self, update: &GuildMemberUpdateEvent) {
        let refreshed = self
            .cache
            .apply_update(update.guild_id, update.user.id, update.patch());
        tracing::trace!(guild_id = %update.guild_id, user_id = %update.user.id, refreshed, "Member update");
    }

    pub(crate) async fn handle_member_list_update(&self, update: &GuildMemberListUpdateEvent) {
        if !update.has_sync() {
            return;
        }
        let mut inner = self.inner.lock().await;
        for state in inner.member_lists.values_mut() {
            if *state == MemberListState::Requested(update.guild_id) {
                *state = MemberListState::Populated;
            }
        }
    }
}
