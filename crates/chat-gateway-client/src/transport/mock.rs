//! Scripted in-memory transport for supervisor tests
//!
//! Every successful `connect` hands the test a [`MockPeer`] playing the
//! server side of that socket. Dropping the peer ends the client's stream.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use url::Url;

use super::{CloseFrame, Connector, Frame, FrameSink, FrameStream};
use crate::error::TransportError;
use crate::protocol::GatewayMessage;

pub(crate) struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    refuse: AtomicU32,
    attempts: AtomicU32,
    connectivity: Option<watch::Receiver<bool>>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        Self::build(None)
    }

    /// Connector that also reports reachability through `online`
    pub(crate) fn with_connectivity(
        online: watch::Receiver<bool>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        Self::build(Some(online))
    }

    fn build(
        connectivity: Option<watch::Receiver<bool>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            refuse: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            connectivity,
        });
        (connector, rx)
    }

    /// Fail the next `n` connect attempts
    pub(crate) fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        url: &Url,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let peer = MockPeer {
            url: url.clone(),
            inbound: to_client,
            outbound: from_client,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("test harness gone".to_string()))?;

        Ok((
            Box::new(MockSink { tx: to_server }),
            Box::new(MockStream { rx: from_server }),
        ))
    }

    fn connectivity(&self) -> Option<watch::Receiver<bool>> {
        self.connectivity.clone()
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.send(Frame::Close(Some(CloseFrame {
            code,
            reason: reason.to_string(),
        })))
        .await
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn receive(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.rx.recv().await)
    }
}

/// Server side of one mock connection
pub(crate) struct MockPeer {
    pub(crate) url: Url,
    inbound: mpsc::UnboundedSender<Frame>,
    outbound: mpsc::UnboundedReceiver<Frame>,
}

impl MockPeer {
    pub(crate) fn send(&self, message: &GatewayMessage) {
        let json = message.to_json().expect("serializable message");
        self.send_frame(Frame::Text(json));
    }

    pub(crate) fn send_frame(&self, frame: Frame) {
        let _ = self.inbound.send(frame);
    }

    pub(crate) fn close(&self, code: u16) {
        self.send_frame(Frame::Close(Some(CloseFrame {
            code,
            reason: String::new(),
        })));
    }

    /// Next raw frame written by the client; `None` once its sink is gone
    pub(crate) async fn next_frame(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Next message written by the client; `None` on close or disconnect
    pub(crate) async fn recv(&mut self) -> Option<GatewayMessage> {
        loop {
            match self.next_frame().await? {
                Frame::Text(text) => {
                    return Some(GatewayMessage::from_json(&text).expect("client sent JSON"));
                }
                Frame::Close(_) => return None,
                Frame::Binary(_) => {}
            }
        }
    }

    /// Message already written by the client, without waiting
    pub(crate) fn try_recv(&mut self) -> Option<GatewayMessage> {
        match self.outbound.try_recv().ok()? {
            Frame::Text(text) => GatewayMessage::from_json(&text).ok(),
            Frame::Binary(_) | Frame::Close(_) => None,
        }
    }
}
