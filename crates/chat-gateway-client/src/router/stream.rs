//! Consumer side of a topic

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::events::{DispatchEvent, Topic};

/// One consumer's delivery queue for a topic
#[derive(Debug)]
pub struct EventStream {
    topic: Topic,
    rx: broadcast::Receiver<Arc<DispatchEvent>>,
    dropped: u64,
}

impl EventStream {
    pub(super) fn new(topic: Topic, rx: broadcast::Receiver<Arc<DispatchEvent>>) -> Self {
        Self {
            topic,
            rx,
            dropped: 0,
        }
    }

    /// Next event; `None` once the client is gone
    pub async fn recv(&mut self) -> Option<Arc<DispatchEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is queued
    pub fn try_recv(&mut self) -> Option<Arc<DispatchEvent>> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Events this consumer lost by falling behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn lagged(&mut self, skipped: u64) {
        self.dropped += skipped;
        tracing::warn!(topic = %self.topic, skipped, "Event consumer lagged, oldest events dropped");
    }
}
