//! Gateway client integration tests
//!
//! Each test drives a real `GatewayClient` over WebSocket against a scripted
//! gateway listening on localhost. No external services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::sync::Arc;
use std::time::Duration;

use chat_core::Snowflake;
use chat_gateway_client::{
    ConnectionState, DispatchEvent, EventStream, GatewayClient, GatewayError, Topic,
};
use integration_tests::*;

/// Long enough that no periodic heartbeat fires during a test
const QUIET_INTERVAL_MS: u64 = 45_000;

async fn next_event(stream: &mut EventStream) -> Arc<DispatchEvent> {
    tokio::time::timeout(STEP_TIMEOUT, stream.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("router closed")
}

/// Connect `client` and complete the handshake on the server side
async fn connect(
    gateway: &mut TestGateway,
    client: &GatewayClient,
    heartbeat_interval_ms: u64,
) -> (ServerConnection, serde_json::Value) {
    let (connected, accepted) = tokio::join!(
        client.connect(TEST_TOKEN),
        gateway.accept_with_hello(heartbeat_interval_ms)
    );
    connected.expect("connect failed");
    accepted.expect("handshake failed")
}

async fn wait_ready(client: &GatewayClient) {
    client
        .readiness()
        .wait_ready_timeout(STEP_TIMEOUT)
        .await
        .expect("client never became ready");
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_identify_and_receive_messages() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));
    let mut messages = client.events().subscribe(Topic::MessageCreate);

    let (mut conn, identify) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    assert_eq!(conn.query(), Some("v=9&encoding=json"));
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], TEST_TOKEN);
    assert!(identify["d"]["properties"]["os"].is_string());

    let (ready, session_id) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();
    wait_ready(&client).await;
    assert_eq!(client.session().session_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(client.current_user().unwrap().username, "tester");

    conn.send(&message_create(2, 55, "hello there")).await.unwrap();
    match next_event(&mut messages).await.as_ref() {
        DispatchEvent::MessageCreate(message) => {
            assert_eq!(message.content, "hello there");
            assert_eq!(message.channel_id, Snowflake::new(55));
        }
        other => panic!("unexpected event {other:?}"),
    }

    client.close().await.unwrap();
    assert_eq!(conn.recv_close().await.unwrap(), Some(1000));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_compressed_stream() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let mut config = test_config(&gateway.url());
    config.gateway.compress = true;
    let client = GatewayClient::with_tungstenite(config);
    let mut messages = client.events().subscribe(Topic::MessageCreate);

    let (mut conn, identify) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    assert!(conn.is_compressed());
    assert_eq!(identify["op"], 2);

    let (ready, _) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();
    wait_ready(&client).await;

    conn.send_split(&message_create(2, 9, "split across frames"))
        .await
        .unwrap();
    conn.send(&message_create(3, 9, "whole")).await.unwrap();

    for expected in ["split across frames", "whole"] {
        match next_event(&mut messages).await.as_ref() {
            DispatchEvent::MessageCreate(message) => assert_eq!(message.content, expected),
            other => panic!("unexpected event {other:?}"),
        }
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_resume_after_connection_drop() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));
    let mut deletes = client.events().subscribe(Topic::MessageDelete);

    let (mut conn, _) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    let (ready, session_id) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();
    conn.send(&message_delete(5, 1, 9)).await.unwrap();
    next_event(&mut deletes).await;

    drop(conn);

    let (mut conn, resume) = gateway.accept_with_hello(QUIET_INTERVAL_MS).await.unwrap();
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], session_id.as_str());
    assert_eq!(resume["d"]["seq"], 5);

    // replay of an event the client already has, then a new one
    conn.send(&message_delete(5, 1, 9)).await.unwrap();
    conn.send(&message_delete(6, 2, 9)).await.unwrap();
    conn.send(&resumed(7)).await.unwrap();
    wait_ready(&client).await;

    match next_event(&mut deletes).await.as_ref() {
        DispatchEvent::MessageDelete(delete) => assert_eq!(delete.id, Snowflake::new(2)),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(client.session().sequence, 7);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_session_reidentifies() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));

    let (mut conn, _) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    let (ready, _) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();
    wait_ready(&client).await;

    conn.send(&invalid_session(false)).await.unwrap();
    assert_eq!(conn.recv_close().await.unwrap(), Some(4000));

    let (_conn, handshake) = gateway.accept_with_hello(QUIET_INTERVAL_MS).await.unwrap();
    assert_eq!(handshake["op"], 2);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_resumable_invalid_session_resumes() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));
    let mut deletes = client.events().subscribe(Topic::MessageDelete);

    let (mut conn, _) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    let (ready, session_id) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();
    conn.send(&message_delete(3, 1, 9)).await.unwrap();
    next_event(&mut deletes).await;

    conn.send(&invalid_session(true)).await.unwrap();
    assert_eq!(conn.recv_close().await.unwrap(), Some(4000));

    let (_conn, handshake) = gateway.accept_with_hello(QUIET_INTERVAL_MS).await.unwrap();
    assert_eq!(handshake["op"], 6);
    assert_eq!(handshake["d"]["session_id"], session_id.as_str());
    assert_eq!(handshake["d"]["seq"], 3);
    assert_eq!(client.session().session_id.as_deref(), Some(session_id.as_str()));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_rejected_token_stops_client() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));

    let (conn, _) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    conn.close(4004).await.unwrap();

    let err = client
        .readiness()
        .wait_ready_timeout(STEP_TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AuthenticationFailed(_)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    gateway
        .expect_no_connection(Duration::from_millis(300))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_gateway_exhausts_retries() {
    // bind then drop to get a port nobody listens on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let mut config = test_config(&format!("ws://{addr}/gateway"));
    config.reconnect.max_retries = 2;
    let client = GatewayClient::with_tungstenite(config);

    let err = tokio::time::timeout(STEP_TIMEOUT, client.connect(TEST_TOKEN))
        .await
        .expect("connect hung")
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::RetriesExhausted { attempts: 2, .. }
    ));
}

// ============================================================================
// Heartbeat Tests
// ============================================================================

#[tokio::test]
async fn test_heartbeats_are_acknowledged() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));

    let (mut conn, _) = connect(&mut gateway, &client, 100).await;
    let (ready, _) = ready(3, &gateway.url());
    conn.send(&ready).await.unwrap();

    for _ in 0..3 {
        let beat = conn.recv().await.unwrap().expect("heartbeat");
        assert_eq!(beat["op"], 1);
        conn.send(&heartbeat_ack()).await.unwrap();
    }
    assert!(client.latency().is_some());
    assert!(client.is_ready());
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_unacknowledged_heartbeat_reconnects() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));

    let (mut conn, _) = connect(&mut gateway, &client, 100).await;
    let (ready, _) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();

    // never acknowledge
    assert_eq!(conn.recv_close().await.unwrap(), Some(4000));
    let (_conn, handshake) = gateway.accept_with_hello(QUIET_INTERVAL_MS).await.unwrap();
    assert_eq!(handshake["op"], 6);
    client.close().await.unwrap();
}

// ============================================================================
// Member Tests
// ============================================================================

#[tokio::test]
async fn test_member_lookup_fills_cache() {
    let mut gateway = TestGateway::start().await.expect("Failed to start gateway");
    let client = GatewayClient::with_tungstenite(test_config(&gateway.url()));
    let guild = Snowflake::new(100);

    let (mut conn, _) = connect(&mut gateway, &client, QUIET_INTERVAL_MS).await;
    let (ready, _) = ready(1, &gateway.url());
    conn.send(&ready).await.unwrap();
    wait_ready(&client).await;

    let lookup = client
        .get_members(guild, [Snowflake::new(11), Snowflake::new(12)])
        .await
        .unwrap();
    assert_eq!(lookup.missing.len(), 2);

    let request = conn.next_message().await.unwrap().expect("member request");
    assert_eq!(request["op"], 8);
    assert_eq!(request["d"]["guild_id"], "100");
    let nonce = request["d"]["nonce"].as_str().unwrap().to_string();

    conn.send(&members_chunk(2, 100, &[11], &nonce)).await.unwrap();
    let batch = tokio::time::timeout(STEP_TIMEOUT, lookup.resolve())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.members.len(), 1);
    assert_eq!(batch.not_found, vec![Snowflake::new(12)]);

    let cached = client.lookup_member(guild, Snowflake::new(11)).unwrap();
    assert_eq!(cached.guild_id, guild);
    assert_eq!(cached.user.username, "user11");

    // served from the cache without another request
    let again = client.get_members(guild, [Snowflake::new(11)]).await.unwrap();
    assert!(again.is_complete());
    client.close().await.unwrap();
}
