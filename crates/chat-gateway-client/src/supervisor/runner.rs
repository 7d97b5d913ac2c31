//! Supervisor task
//!
//! One runner per `connect` call. It loops over connection attempts until the
//! owner closes the client, the server closes with a fatal code, or the
//! reconnect budget is spent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::Shared;
use crate::connection::{Backoff, ConnectionState, Fault, SequenceCheck};
use crate::error::{CodecError, GatewayError};
use crate::events::DispatchEvent;
use crate::heartbeat::HeartbeatScheduler;
use crate::protocol::{
    Capabilities, CloseCode, CloseDisposition, Codec, GatewayEnvelope, GatewayMessage,
    HelloPayload, IdentifyPayload, IdentifyProperties, OpCode,
};
use crate::transport::{Frame, FrameStream};
use crate::writer::{rate_limiter, spawn_writer, Outbound};

/// How one connection ended
#[derive(Debug)]
enum Outcome {
    /// The owner closed the client
    Closed,
    /// Connection lost; try again after backoff
    Reconnect {
        reason: String,
        /// Session is gone; the next handshake must be Identify
        clear_session: bool,
    },
    /// Stop and report
    Fatal(GatewayError),
}

impl Outcome {
    fn reconnect(reason: impl Into<String>) -> Self {
        Self::Reconnect {
            reason: reason.into(),
            clear_session: false,
        }
    }
}

/// Decoded inbound frame
enum Inbound {
    Envelope(GatewayEnvelope),
    /// Part of a compressed message; more frames needed
    Partial,
    Closed(Option<u16>),
}

pub(super) struct Runner {
    shared: Arc<Shared>,
    token: String,
    cancel: CancellationToken,
    backoff: Backoff,
    codec: Codec,
    connectivity: Option<watch::Receiver<bool>>,
}

impl Runner {
    pub(super) fn new(shared: Arc<Shared>, token: String, cancel: CancellationToken) -> Self {
        let reconnect = &shared.config.reconnect;
        let backoff = Backoff::new(
            reconnect.base_delay(),
            reconnect.max_delay(),
            reconnect.max_retries,
        );
        let codec = Codec::new(shared.config.gateway.compress);
        let connectivity = shared.connector.connectivity();
        Self {
            shared,
            token,
            cancel,
            backoff,
            codec,
            connectivity,
        }
    }

    pub(super) async fn run(mut self) {
        let terminal = loop {
            match self.connect_and_run().await {
                Outcome::Closed => break None,
                Outcome::Fatal(e) => break Some(e),
                Outcome::Reconnect {
                    reason,
                    clear_session,
                } => {
                    if clear_session {
                        self.shared.session.lock().invalidate();
                    }
                    self.shared.set_state(ConnectionState::Reconnecting);

                    let Some(delay) = self.backoff.next_delay() else {
                        break Some(GatewayError::RetriesExhausted {
                            attempts: self.backoff.attempts(),
                            last_error: reason,
                        });
                    };
                    tracing::warn!(
                        reason = %reason,
                        attempt = self.backoff.attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Gateway connection lost, reconnecting"
                    );
                    if !self.sleep_or_shutdown(delay).await {
                        break None;
                    }
                    self.shared.set_state(ConnectionState::Connecting);
                }
            }
        };
        self.finish(terminal).await;
    }

    /// Wait out a backoff delay
    ///
    /// Returns `false` if the client was closed meanwhile. The network coming
    /// back cuts the wait short.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        let sleep = time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                () = &mut sleep => return true,
                online = connectivity_change(&mut self.connectivity) => {
                    if online {
                        tracing::info!("Network reachable again, reconnecting now");
                        return true;
                    }
                }
            }
        }
    }

    async fn finish(&self, terminal: Option<GatewayError>) {
        self.shared.set_state(ConnectionState::Closing);
        match &terminal {
            Some(GatewayError::AuthenticationFailed(code)) => {
                tracing::error!(code = %code, "Gateway rejected the token");
                self.shared.clear_account();
            }
            Some(e) => tracing::error!(error = %e, "Gateway client stopped"),
            None => {
                // the close frame ended the session server-side
                self.shared.session.lock().invalidate();
                tracing::info!("Gateway client closed");
            }
        }
        self.shared.subscriptions.invalidate().await;
        self.shared.stop(terminal.unwrap_or(GatewayError::Closed));
    }

    fn gateway_url(&self) -> Result<Url, GatewayError> {
        let config = &self.shared.config.gateway;
        let resume_url = {
            let session = self.shared.session.lock();
            session
                .can_resume()
                .then(|| session.resume_url.clone())
                .flatten()
        };

        if let Some(base) = resume_url {
            match build_url(&base, config.api_version, config.compress) {
                Ok(url) => return Ok(url),
                Err(e) => tracing::warn!(error = %e, "Ignoring unusable resume URL"),
            }
        }
        build_url(&config.url, config.api_version, config.compress).map_err(GatewayError::Config)
    }

    fn identify_payload(&self) -> IdentifyPayload {
        IdentifyPayload::new(
            self.token.clone(),
            IdentifyProperties::from(&self.shared.config.properties),
            Capabilities::default(),
            false,
        )
    }

    async fn connect_and_run(&mut self) -> Outcome {
        let url = match self.gateway_url() {
            Ok(url) => url,
            Err(e) => return Outcome::Fatal(e),
        };
        let timeout = self.shared.config.gateway.connect_timeout();
        tracing::info!(url = %url, "Connecting to gateway");

        let connected = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Outcome::Closed,
            connected = time::timeout(timeout, self.shared.connector.connect(&url)) => connected,
        };
        let (mut sink, mut stream) = match connected {
            Ok(Ok(halves)) => halves,
            Ok(Err(e)) => return Outcome::reconnect(e.to_string()),
            Err(_) => return Outcome::reconnect(GatewayError::ConnectTimeout.to_string()),
        };

        self.shared.set_state(ConnectionState::AwaitingHello);
        self.codec.reset();

        let cancel = self.cancel.clone();
        let hello = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = sink.close(CloseCode::CLIENT_NORMAL, "client closed").await;
                return Outcome::Closed;
            }
            hello = time::timeout(timeout, self.wait_for_hello(stream.as_mut())) => hello,
        };
        let interval_ms = match hello {
            Ok(Ok(interval_ms)) => interval_ms,
            Ok(Err(outcome)) => return outcome,
            Err(_) => {
                let _ = sink
                    .close(CloseCode::CLIENT_RECONNECT, "hello timeout")
                    .await;
                return Outcome::reconnect(GatewayError::ConnectTimeout.to_string());
            }
        };
        self.shared.session.lock().heartbeat_interval_ms = interval_ms;
        tracing::debug!(heartbeat_interval_ms = interval_ms, "Hello received");

        let conn_cancel = self.cancel.child_token();
        let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
        // fresh quota per connection
        let limiter = rate_limiter(self.shared.config.gateway.outbound_per_minute);
        let (outbound, writer) = spawn_writer(sink, limiter, conn_cancel.clone(), fault_tx.clone());

        let (greeting, state) = self.handshake();
        let _ = outbound.send_priority(greeting).await;
        self.shared.set_state(state);

        self.shared.monitor.reset();
        let sequence = {
            let shared = self.shared.clone();
            Arc::new(move || shared.session.lock().heartbeat_sequence())
        };
        let heartbeat = HeartbeatScheduler::new(
            Duration::from_millis(interval_ms),
            self.shared.monitor.clone(),
            outbound.clone(),
            sequence,
            conn_cancel.clone(),
            fault_tx,
        )
        .spawn();

        let (outcome, send_close) = self
            .event_loop(stream.as_mut(), &outbound, &mut fault_rx)
            .await;

        // Teardown: leave Ready and stop the heartbeat before anything awaits
        let next = match outcome {
            Outcome::Reconnect { .. } => ConnectionState::Reconnecting,
            Outcome::Closed | Outcome::Fatal(_) => ConnectionState::Closing,
        };
        self.shared.set_state(next);
        conn_cancel.cancel();
        self.shared.subscriptions.invalidate().await;

        drop(outbound);
        let _ = heartbeat.await;
        let sink = writer.await.ok().flatten();

        if send_close {
            if let Some(mut sink) = sink {
                let (code, reason) = match outcome {
                    Outcome::Closed => (CloseCode::CLIENT_NORMAL, "client closed"),
                    _ => (CloseCode::CLIENT_RECONNECT, "reconnecting"),
                };
                if let Err(e) = sink.close(code, reason).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
            }
        }
        outcome
    }

    /// Resume when the session allows it, otherwise start a fresh one
    fn handshake(&self) -> (GatewayMessage, ConnectionState) {
        let mut session = self.shared.session.lock();
        match session.resume_payload(&self.token) {
            Some(resume) => {
                tracing::info!(
                    session_id = %resume.session_id,
                    seq = resume.seq,
                    "Resuming session"
                );
                (GatewayMessage::resume(&resume), ConnectionState::Resuming)
            }
            None => {
                session.invalidate();
                tracing::info!("Identifying");
                (
                    GatewayMessage::identify(&self.identify_payload()),
                    ConnectionState::Identifying,
                )
            }
        }
    }

    async fn wait_for_hello(&mut self, stream: &mut dyn FrameStream) -> Result<u64, Outcome> {
        loop {
            let frame = match stream.receive().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Err(Outcome::reconnect("socket closed before Hello")),
                Err(e) => return Err(Outcome::reconnect(e.to_string())),
            };
            match self.decode(frame) {
                Ok(Inbound::Envelope(envelope)) if envelope.op() == OpCode::Hello => {
                    let hello: HelloPayload = envelope
                        .payload()
                        .map_err(|e| Outcome::reconnect(e.to_string()))?;
                    return Ok(hello.heartbeat_interval);
                }
                Ok(Inbound::Envelope(envelope)) => {
                    tracing::debug!(op = %envelope.op(), "Ignoring frame before Hello");
                }
                Ok(Inbound::Partial) => {}
                Ok(Inbound::Closed(code)) => return Err(close_outcome(code)),
                Err(e @ CodecError::Decompress(_)) => return Err(Outcome::reconnect(e.to_string())),
                Err(e) => tracing::warn!(error = %e, "Dropping undecodable frame"),
            }
        }
    }

    /// Read loop for a live connection
    ///
    /// The returned flag says whether the client should send a close frame.
    async fn event_loop(
        &mut self,
        stream: &mut dyn FrameStream,
        outbound: &Outbound,
        faults: &mut mpsc::UnboundedReceiver<Fault>,
    ) -> (Outcome, bool) {
        loop {
            let received = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return (Outcome::Closed, true),
                Some(fault) = faults.recv() => return (Outcome::reconnect(fault.to_string()), true),
                online = connectivity_change(&mut self.connectivity) => {
                    if online {
                        continue;
                    }
                    return (Outcome::reconnect("network unreachable"), true);
                }
                received = stream.receive() => received,
            };

            let frame = match received {
                Ok(Some(frame)) => frame,
                Ok(None) => return (Outcome::reconnect("socket closed"), false),
                Err(e) => return (Outcome::reconnect(e.to_string()), false),
            };
            let envelope = match self.decode(frame) {
                Ok(Inbound::Envelope(envelope)) => envelope,
                Ok(Inbound::Partial) => continue,
                Ok(Inbound::Closed(code)) => return (close_outcome(code), false),
                Err(e @ CodecError::Decompress(_)) => {
                    return (Outcome::reconnect(e.to_string()), true);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping undecodable frame");
                    continue;
                }
            };

            if let Some(outcome) = self.handle_envelope(&envelope, outbound).await {
                return (outcome, true);
            }
        }
    }

    fn decode(&mut self, frame: Frame) -> Result<Inbound, CodecError> {
        match frame {
            Frame::Text(text) => self.codec.decode_text(&text).map(Inbound::Envelope),
            Frame::Binary(bytes) => Ok(self
                .codec
                .decode_binary(&bytes)?
                .map_or(Inbound::Partial, Inbound::Envelope)),
            Frame::Close(close) => Ok(Inbound::Closed(close.map(|c| c.code))),
        }
    }

    async fn handle_envelope(
        &mut self,
        envelope: &GatewayEnvelope,
        outbound: &Outbound,
    ) -> Option<Outcome> {
        tracing::trace!(op = %envelope.op(), t = ?envelope.event_name(), s = ?envelope.sequence(), "Frame received");
        match envelope.op() {
            OpCode::Dispatch => {
                self.handle_dispatch(envelope, outbound).await;
                None
            }
            OpCode::Heartbeat => {
                let seq = self.shared.session.lock().heartbeat_sequence();
                self.shared.monitor.beat_sent();
                tracing::debug!(seq = ?seq, "Heartbeat requested by server");
                let _ = outbound.send_priority(GatewayMessage::heartbeat(seq)).await;
                None
            }
            OpCode::HeartbeatAck => {
                self.shared.monitor.record_ack();
                None
            }
            OpCode::Reconnect => {
                tracing::info!("Server requested reconnect");
                Some(Outcome::reconnect("server requested reconnect"))
            }
            OpCode::InvalidSession => {
                let resumable = envelope
                    .payload::<Option<bool>>()
                    .ok()
                    .flatten()
                    .unwrap_or(false);
                tracing::warn!(resumable, "Session invalidated by server");
                Some(Outcome::Reconnect {
                    reason: "invalid session".to_string(),
                    clear_session: !resumable,
                })
            }
            op => {
                tracing::debug!(op = %op, "Ignoring unexpected opcode");
                None
            }
        }
    }

    async fn handle_dispatch(&mut self, envelope: &GatewayEnvelope, outbound: &Outbound) {
        if let Some(seq) = envelope.sequence() {
            let check = self.shared.session.lock().observe_sequence(seq);
            if check == SequenceCheck::Stale {
                tracing::debug!(seq, event = ?envelope.event_name(), "Dropping already-seen dispatch");
                return;
            }
        }

        let event = match DispatchEvent::decode(envelope) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    event = ?envelope.event_name(),
                    seq = ?envelope.sequence(),
                    error = %e,
                    "Dropping malformed dispatch"
                );
                return;
            }
        };

        match &event {
            DispatchEvent::Ready(ready) => {
                self.shared
                    .session
                    .lock()
                    .establish(ready.session_id.clone(), ready.resume_gateway_url.clone());
                *self.shared.current_user.write() = Some(ready.user.clone());
                tracing::info!(
                    session_id = %ready.session_id,
                    user = %ready.user.tag(),
                    guilds = ready.guilds.len(),
                    "Session ready"
                );
                self.became_ready(outbound).await;
            }
            DispatchEvent::Resumed => {
                tracing::info!(seq = ?envelope.sequence(), "Session resumed");
                self.became_ready(outbound).await;
            }
            DispatchEvent::GuildMembersChunk(chunk) => {
                self.shared.subscriptions.handle_members_chunk(chunk).await;
            }
            DispatchEvent::GuildMemberUpdate(update) => {
                self.shared.subscriptions.handle_member_update(update);
            }
            DispatchEvent::GuildMemberListUpdate(update) => {
                self.shared
                    .subscriptions
                    .handle_member_list_update(update)
                    .await;
            }
            DispatchEvent::Unknown { name } => {
                tracing::trace!(event = %name, "Unhandled dispatch");
            }
            _ => {}
        }

        self.shared.router.route(event);
    }

    async fn became_ready(&mut self, outbound: &Outbound) {
        self.backoff.reset();
        self.shared.subscriptions.attach(outbound.clone()).await;
        self.shared.set_state(ConnectionState::Ready);
    }
}

/// Build `<base>?v=<version>&encoding=json[&compress=zlib-stream]`
fn build_url(base: &str, api_version: u8, compress: bool) -> Result<Url, String> {
    let mut url = Url::parse(base).map_err(|e| format!("invalid gateway URL {base:?}: {e}"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(format!("gateway URL must be ws:// or wss://, got {base:?}"));
    }
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("v", &api_version.to_string())
            .append_pair("encoding", "json");
        if compress {
            query.append_pair("compress", "zlib-stream");
        }
    }
    Ok(url)
}

/// React to a close frame from the server
fn close_outcome(code: Option<u16>) -> Outcome {
    let Some(code) = code else {
        return Outcome::reconnect("server closed without a status code");
    };
    let reason = format!("server closed with {code}");
    match CloseDisposition::of(code) {
        CloseDisposition::Resume => Outcome::reconnect(reason),
        CloseDisposition::Reidentify => Outcome::Reconnect {
            reason,
            clear_session: true,
        },
        CloseDisposition::Fatal => match CloseCode::from_u16(code) {
            Some(CloseCode::AuthenticationFailed) => {
                Outcome::Fatal(GatewayError::AuthenticationFailed(CloseCode::AuthenticationFailed))
            }
            Some(close) => Outcome::Fatal(GatewayError::FatalClose(close)),
            None => Outcome::reconnect(reason),
        },
    }
}

/// Next reachability change; pends forever without a connectivity source
async fn connectivity_change(connectivity: &mut Option<watch::Receiver<bool>>) -> bool {
    match connectivity {
        Some(rx) => {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            *rx.borrow_and_update()
        }
        None => std::future::pending().await,
    }
}
