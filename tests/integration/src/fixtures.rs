//! Test fixtures and payload builders
//!
//! Server frames are built as raw JSON so the tests check the wire format the
//! client accepts, not the client's own serializers.

use std::sync::atomic::{AtomicU64, Ordering};

use chat_common::ClientConfig;
use serde_json::{json, Value};

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Token the tests identify with
pub const TEST_TOKEN: &str = "test-token";

/// Client configuration pointed at a local gateway, with fast reconnects
pub fn test_config(gateway_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new(gateway_url);
    config.gateway.connect_timeout_ms = 5_000;
    config.reconnect.base_delay_ms = 20;
    config.reconnect.max_delay_ms = 100;
    config.reconnect.max_retries = 5;
    config
}

pub fn hello(heartbeat_interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": heartbeat_interval_ms}})
}

pub fn heartbeat_ack() -> Value {
    json!({"op": 11})
}

pub fn reconnect() -> Value {
    json!({"op": 7})
}

pub fn invalid_session(resumable: bool) -> Value {
    json!({"op": 9, "d": resumable})
}

pub fn dispatch(event: &str, seq: u64, data: Value) -> Value {
    json!({"op": 0, "t": event, "s": seq, "d": data})
}

/// READY for a fresh session; returns the frame and its session id
pub fn ready(seq: u64, resume_url: &str) -> (Value, String) {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    let frame = dispatch(
        "READY",
        seq,
        json!({
            "v": 9,
            "user": {"id": "4242", "username": "tester", "discriminator": "0"},
            "guilds": [{"id": "100", "unavailable": true}],
            "session_id": session_id,
            "resume_gateway_url": resume_url
        }),
    );
    (frame, session_id)
}

pub fn resumed(seq: u64) -> Value {
    dispatch("RESUMED", seq, Value::Null)
}

pub fn message_create(seq: u64, channel_id: u64, content: &str) -> Value {
    let suffix = unique_suffix();
    dispatch(
        "MESSAGE_CREATE",
        seq,
        json!({
            "id": (900_000 + suffix).to_string(),
            "channel_id": channel_id.to_string(),
            "author": {"id": "77", "username": "someone"},
            "content": content,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }),
    )
}

pub fn message_delete(seq: u64, message_id: u64, channel_id: u64) -> Value {
    dispatch(
        "MESSAGE_DELETE",
        seq,
        json!({"id": message_id.to_string(), "channel_id": channel_id.to_string()}),
    )
}

pub fn members_chunk(seq: u64, guild_id: u64, user_ids: &[u64], nonce: &str) -> Value {
    let members: Vec<Value> = user_ids
        .iter()
        .map(|id| json!({"user": {"id": id.to_string(), "username": format!("user{id}")}, "roles": []}))
        .collect();
    dispatch(
        "GUILD_MEMBERS_CHUNK",
        seq,
        json!({
            "guild_id": guild_id.to_string(),
            "members": members,
            "chunk_index": 0,
            "chunk_count": 1,
            "nonce": nonce
        }),
    )
}
