//! # chat-gateway-client
//!
//! Client for a realtime chat gateway: keeps one authenticated WebSocket
//! session alive across drops, heartbeats it, resumes or re-identifies as the
//! server allows, and fans decoded events out to per-topic consumers.
//!
//! ```no_run
//! use chat_common::ClientConfig;
//! use chat_gateway_client::{GatewayClient, Topic};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = GatewayClient::with_tungstenite(ClientConfig::from_env()?);
//! let mut messages = client.events().subscribe(Topic::MessageCreate);
//! client.connect("token").await?;
//! client.wait_until_ready().await?;
//! while let Some(event) = messages.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod connection;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod protocol;
pub mod router;
pub mod subscription;
pub mod supervisor;
pub mod transport;
mod writer;

pub use cache::MemberCache;
pub use connection::{ConnectionState, SessionState};
pub use error::{CodecError, GatewayError, GatewayResult, TransportError};
pub use events::{DispatchEvent, Topic};
pub use heartbeat::HeartbeatMonitor;
pub use router::{EventRouter, EventStream};
pub use subscription::{MemberBatch, MemberLookup, MemberRange};
pub use supervisor::{GatewayClient, ReadinessGate};
pub use transport::{CloseFrame, Connector, Frame, FrameSink, FrameStream, TungsteniteConnector};
