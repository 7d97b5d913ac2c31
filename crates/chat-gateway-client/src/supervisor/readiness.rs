//! Readiness gate handed to collaborators that need a live session

use std::time::Duration;

use tokio::sync::watch;

use crate::connection::ConnectionState;
use crate::error::{GatewayError, GatewayResult};

/// Supervisor status as published to observers
#[derive(Debug, Clone, Default)]
pub(crate) struct Status {
    pub(crate) state: ConnectionState,
    /// Why the last run ended; cleared by `connect`
    pub(crate) error: Option<GatewayError>,
}

impl Status {
    /// The supervisor has stopped and will not retry on its own
    pub(crate) fn is_stopped(&self) -> bool {
        self.state == ConnectionState::Disconnected && self.error.is_some()
    }
}

/// Cloneable view of the client's readiness
///
/// Callers that need an authenticated session wait on this instead of
/// firing requests while the connection is not Ready.
#[derive(Debug, Clone)]
pub struct ReadinessGate {
    rx: watch::Receiver<Status>,
}

impl ReadinessGate {
    pub(crate) fn new(rx: watch::Receiver<Status>) -> Self {
        Self { rx }
    }

    pub fn is_ready(&self) -> bool {
        self.rx.borrow().state == ConnectionState::Ready
    }

    pub fn state(&self) -> ConnectionState {
        self.rx.borrow().state
    }

    /// Error that stopped the supervisor, if it has stopped
    pub fn error(&self) -> Option<GatewayError> {
        self.rx.borrow().error.clone()
    }

    /// Suspend until the session is Ready
    ///
    /// Returns the terminal error if the supervisor stops first. A client
    /// that was never connected keeps the caller waiting.
    pub async fn wait_ready(&self) -> GatewayResult<()> {
        let mut rx = self.rx.clone();
        let status = rx
            .wait_for(|s| s.state == ConnectionState::Ready || s.is_stopped())
            .await
            .map_err(|_| GatewayError::Closed)?;
        if status.state == ConnectionState::Ready {
            Ok(())
        } else {
            Err(status.error.clone().unwrap_or(GatewayError::Closed))
        }
    }

    /// Suspend until the supervisor stops on its own and return why
    pub async fn wait_stopped(&self) -> GatewayError {
        let mut rx = self.rx.clone();
        let error = match rx.wait_for(Status::is_stopped).await {
            Ok(status) => status.error.clone().unwrap_or(GatewayError::Closed),
            Err(_) => GatewayError::Closed,
        };
        error
    }

    /// `wait_ready` bounded by `timeout`; `NotReady` when it elapses
    pub async fn wait_ready_timeout(&self, timeout: Duration) -> GatewayResult<()> {
        tokio::time::timeout(timeout, self.wait_ready())
            .await
            .map_err(|_| GatewayError::NotReady)?
    }
}
