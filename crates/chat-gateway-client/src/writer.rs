//! Single outbound writer
//!
//! Every frame a connection sends (Identify, Resume, heartbeats, subscribe and
//! member requests) goes through one task that owns the socket's write half,
//! so frames are never interleaved.
//!
//! Frames travel on two lanes. Heartbeats and handshakes take the priority
//! lane, which is drained first and is exempt from the rate limit, so a
//! backlog of member requests can never delay a keepalive past its deadline.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::Fault;
use crate::error::{GatewayError, GatewayResult, TransportError};
use crate::protocol::{Codec, GatewayMessage};
use crate::transport::FrameSink;

/// Application frames one connection may have queued
const OUTBOUND_QUEUE: usize = 1024;

/// Heartbeats and handshakes waiting for the socket
const PRIORITY_QUEUE: usize = 8;

/// Limiter pacing application frames to `per_minute`, bursting up to the quota
pub(crate) fn rate_limiter(per_minute: u32) -> Arc<DefaultDirectRateLimiter> {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)))
}

/// Handle for queueing frames on the current connection
#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    tx: mpsc::Sender<GatewayMessage>,
    priority: mpsc::Sender<GatewayMessage>,
}

impl Outbound {
    /// Queue a heartbeat or handshake ahead of application frames
    pub(crate) async fn send_priority(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.priority
            .send(message)
            .await
            .map_err(|_| GatewayError::Transport(TransportError::Closed))
    }

    /// Queue an application frame without waiting
    pub(crate) fn try_send(&self, message: GatewayMessage) -> GatewayResult<()> {
        self.try_send_all(vec![message])
    }

    /// Queue application frames without waiting
    ///
    /// Either every frame is queued or none is; a full queue fails with
    /// `OutboundFull`.
    pub(crate) fn try_send_all(&self, messages: Vec<GatewayMessage>) -> GatewayResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let permits = self
            .tx
            .try_reserve_many(messages.len())
            .map_err(|e| match e {
                TrySendError::Full(()) => GatewayError::OutboundFull,
                TrySendError::Closed(()) => GatewayError::Transport(TransportError::Closed),
            })?;
        for (permit, message) in permits.zip(messages) {
            permit.send(message);
        }
        Ok(())
    }

    /// Both lanes feeding one receiver
    #[cfg(test)]
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<GatewayMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx: tx.clone(),
                priority: tx,
            },
            rx,
        )
    }
}

/// Spawn the writer for one connection
///
/// The task ends on cancellation or when every `Outbound` is dropped and
/// hands the sink back so the caller can send a close frame. A failed write
/// is reported as a fault and the sink is discarded.
pub(crate) fn spawn_writer(
    sink: Box<dyn FrameSink>,
    limiter: Arc<DefaultDirectRateLimiter>,
    cancel: CancellationToken,
    faults: mpsc::UnboundedSender<Fault>,
) -> (Outbound, JoinHandle<Option<Box<dyn FrameSink>>>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    let (priority, priority_rx) = mpsc::channel(PRIORITY_QUEUE);
    let lanes = Lanes { priority: priority_rx, normal: rx };
    let handle = tokio::spawn(write_loop(sink, lanes, limiter, cancel, faults));
    (Outbound { tx, priority }, handle)
}

struct Lanes {
    priority: mpsc::Receiver<GatewayMessage>,
    normal: mpsc::Receiver<GatewayMessage>,
}

async fn write_loop(
    mut sink: Box<dyn FrameSink>,
    mut lanes: Lanes,
    limiter: Arc<DefaultDirectRateLimiter>,
    cancel: CancellationToken,
    faults: mpsc::UnboundedSender<Fault>,
) -> Option<Box<dyn FrameSink>> {
    // application frame waiting for rate-limit capacity
    let mut held: Option<GatewayMessage> = None;
    loop {
        let message = match held.take() {
            Some(message) => tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(urgent) = lanes.priority.recv() => {
                    held = Some(message);
                    urgent
                }
                () = limiter.until_ready() => message,
            },
            None => tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(urgent) = lanes.priority.recv() => urgent,
                message = lanes.normal.recv() => match message {
                    Some(message) => {
                        held = Some(message);
                        continue;
                    }
                    None => break,
                },
            },
        };

        let frame = match Codec::encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(op = %message.op, error = %e, "Dropping unencodable frame");
                continue;
            }
        };

        tracing::trace!(op = %message.op, "Sending frame");
        if let Err(e) = sink.send(frame).await {
            tracing::warn!(op = %message.op, error = %e, "Gateway write failed");
            let _ = faults.send(Fault::WriterFailed(e));
            return None;
        }
    }
    Some(sink)
}
