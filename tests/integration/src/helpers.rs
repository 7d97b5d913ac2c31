//! Test helpers for integration tests
//!
//! [`TestGateway`] listens on an ephemeral local port and hands every accepted
//! WebSocket to the test as a [`ServerConnection`], which plays the server's
//! side of the protocol one frame at a time.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use flate2::{Compress, Compression, FlushCompress};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

/// How long any single wait in a test may take
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Heartbeat op code, answered automatically by `next_message`
const OP_HEARTBEAT: u64 = 1;

const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Scripted gateway server
pub struct TestGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<ServerConnection>,
    _handle: JoinHandle<()>,
}

impl TestGateway {
    /// Start listening on 127.0.0.1 with an OS-assigned port
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, connections) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    match ServerConnection::accept(stream).await {
                        Ok(conn) => {
                            let _ = tx.send(conn);
                        }
                        Err(e) => eprintln!("test gateway handshake failed: {e:#}"),
                    }
                });
            }
        });

        Ok(Self {
            addr,
            connections,
            _handle: handle,
        })
    }

    /// Base URL clients should connect to
    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Result<ServerConnection> {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .context("timed out waiting for a client connection")?
            .context("test gateway stopped")
    }

    /// Accept a connection, greet it, and return it with the client's handshake
    pub async fn accept_with_hello(
        &mut self,
        heartbeat_interval_ms: u64,
    ) -> Result<(ServerConnection, Value)> {
        let mut conn = self.accept().await?;
        conn.send(&crate::hello(heartbeat_interval_ms)).await?;
        let handshake = conn
            .next_message()
            .await?
            .context("client closed before identifying")?;
        Ok((conn, handshake))
    }

    /// Assert that no client connects within `wait`
    pub async fn expect_no_connection(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.connections.recv()).await {
            Ok(Some(_)) => bail!("client connected unexpectedly"),
            Ok(None) | Err(_) => Ok(()),
        }
    }
}

/// Server side of one client connection
pub struct ServerConnection {
    ws: WebSocketStream<TcpStream>,
    query: Option<String>,
    deflate: Option<Compress>,
}

impl ServerConnection {
    async fn accept(stream: TcpStream) -> Result<Self> {
        let mut query = None;
        let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            query = req.uri().query().map(str::to_string);
            Ok(resp)
        };
        let ws = accept_hdr_async(stream, callback).await?;

        let compress = query
            .as_deref()
            .is_some_and(|q| q.split('&').any(|pair| pair == "compress=zlib-stream"));
        Ok(Self {
            ws,
            query,
            deflate: compress.then(|| Compress::new(Compression::default(), true)),
        })
    }

    /// Query string of the upgrade request
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_compressed(&self) -> bool {
        self.deflate.is_some()
    }

    /// Send a payload, compressed when the client asked for zlib-stream
    pub async fn send(&mut self, payload: &Value) -> Result<()> {
        let text = payload.to_string();
        let message = if self.deflate.is_some() {
            Message::Binary(self.compress(text.as_bytes())?)
        } else {
            Message::Text(text)
        };
        self.ws.send(message).await?;
        Ok(())
    }

    /// Send a compressed payload split over two binary frames
    pub async fn send_split(&mut self, payload: &Value) -> Result<()> {
        let mut bytes = self.compress(payload.to_string().as_bytes())?;
        let tail = bytes.split_off(bytes.len() / 2);
        self.ws.send(Message::Binary(bytes)).await?;
        self.ws.send(Message::Binary(tail)).await?;
        Ok(())
    }

    fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let deflate = self
            .deflate
            .as_mut()
            .context("client did not request compression")?;
        let mut out = Vec::with_capacity(input.len() * 2 + 128);
        deflate.compress_vec(input, &mut out, FlushCompress::Sync)?;
        if !out.ends_with(&ZLIB_SUFFIX) {
            bail!("deflate output was not flushed");
        }
        Ok(out)
    }

    /// Next JSON frame from the client; `None` once it closes
    pub async fn recv(&mut self) -> Result<Option<Value>> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a client frame")?;
            match frame {
                Some(Ok(Message::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Next frame that is not a heartbeat; heartbeats are acknowledged
    pub async fn next_message(&mut self) -> Result<Option<Value>> {
        loop {
            let Some(frame) = self.recv().await? else {
                return Ok(None);
            };
            if frame["op"] == OP_HEARTBEAT {
                self.send(&crate::heartbeat_ack()).await?;
                continue;
            }
            return Ok(Some(frame));
        }
    }

    /// Read until the client's close frame and return its code
    pub async fn recv_close(&mut self) -> Result<Option<u16>> {
        loop {
            let frame = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for the close frame")?;
            match frame {
                Some(Ok(Message::Close(close))) => return Ok(close.map(|c| u16::from(c.code))),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => bail!("connection ended without a close frame"),
            }
        }
    }

    /// Close the connection with `code`
    pub async fn close(mut self, code: u16) -> Result<()> {
        self.ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))
            .await?;
        Ok(())
    }
}
