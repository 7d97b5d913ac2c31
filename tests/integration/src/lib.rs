//! Integration test utilities for the gateway client
//!
//! This crate runs a scripted gateway server on a local port so the client can
//! be exercised over real WebSocket connections.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
