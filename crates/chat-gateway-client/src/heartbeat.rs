//! Heartbeat keepalive
//!
//! One scheduler task per connection. The first beat is jittered over a full
//! interval so a fleet of clients reconnecting together does not beat in
//! lockstep; later beats are periodic. A beat that comes due while the
//! previous one is still unacknowledged means the connection is a zombie.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::connection::Fault;
use crate::protocol::GatewayMessage;
use crate::writer::Outbound;

/// Ack bookkeeping shared by the scheduler and the read loop
#[derive(Debug)]
pub struct HeartbeatMonitor {
    acked: AtomicBool,
    sent_at: Mutex<Option<Instant>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            acked: AtomicBool::new(true),
            sent_at: Mutex::new(None),
            latency: Mutex::new(None),
        }
    }

    /// Fresh connection: nothing outstanding
    pub fn reset(&self) {
        self.acked.store(true, Ordering::SeqCst);
        *self.sent_at.lock() = None;
    }

    /// Claim the next periodic beat
    ///
    /// Returns `false` when the previous beat was never acknowledged.
    pub fn begin_beat(&self) -> bool {
        if !self.acked.swap(false, Ordering::SeqCst) {
            return false;
        }
        *self.sent_at.lock() = Some(Instant::now());
        true
    }

    /// A beat sent outside the schedule, at the server's request
    pub fn beat_sent(&self) {
        *self.sent_at.lock() = Some(Instant::now());
    }

    pub fn record_ack(&self) {
        self.acked.store(true, Ordering::SeqCst);
        if let Some(sent) = self.sent_at.lock().take() {
            *self.latency.lock() = Some(sent.elapsed());
        }
    }

    /// Round trip of the most recently acknowledged beat
    pub fn latency(&self) -> Option<Duration> {
        *self.latency.lock()
    }
}

/// Source of the sequence number echoed in each beat
pub(crate) type SequenceSource = Arc<dyn Fn() -> Option<u64> + Send + Sync>;

pub(crate) struct HeartbeatScheduler {
    interval: Duration,
    monitor: Arc<HeartbeatMonitor>,
    outbound: Outbound,
    sequence: SequenceSource,
    cancel: CancellationToken,
    faults: mpsc::UnboundedSender<Fault>,
}

impl HeartbeatScheduler {
    pub(crate) fn new(
        interval: Duration,
        monitor: Arc<HeartbeatMonitor>,
        outbound: Outbound,
        sequence: SequenceSource,
        cancel: CancellationToken,
        faults: mpsc::UnboundedSender<Fault>,
    ) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            monitor,
            outbound,
            sequence,
            cancel,
            faults,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..interval_ms));
        tracing::debug!(
            interval_ms,
            first_beat_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX),
            "Heartbeat scheduled"
        );

        let mut ticker = time::interval_at(Instant::now() + jitter, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            if !self.monitor.begin_beat() {
                tracing::warn!("Heartbeat not acknowledged, connection is a zombie");
                let _ = self.faults.send(Fault::Zombie);
                return;
            }

            let seq = (self.sequence)();
            tracing::trace!(seq = ?seq, "Heartbeat");
            let sent = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                sent = self.outbound.send_priority(GatewayMessage::heartbeat(seq)) => sent,
            };
            if sent.is_err() {
                return;
            }
        }
    }
}
