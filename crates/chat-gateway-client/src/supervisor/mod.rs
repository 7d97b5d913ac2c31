//! Connection supervisor
//!
//! [`GatewayClient`] is the handle consumers hold. It is cheap to clone and
//! every clone drives the same connection, so it is injected wherever the
//! gateway is needed instead of living in a global.

mod readiness;
mod runner;

use std::sync::Arc;
use std::time::Duration;

use chat_common::ClientConfig;
use chat_core::{GuildMember, Snowflake, User};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::MemberCache;
use crate::connection::{ConnectionState, SessionState};
use crate::error::{GatewayError, GatewayResult};
use crate::heartbeat::HeartbeatMonitor;
use crate::router::EventRouter;
use crate::subscription::{MemberLookup, MemberRange, SubscriptionManager};
use crate::transport::{Connector, TungsteniteConnector};

pub use readiness::ReadinessGate;
pub(crate) use readiness::Status;
use runner::Runner;

/// Running supervisor task, if any
#[derive(Default)]
struct Control {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// State shared by the client handle and its supervisor task
pub(crate) struct Shared {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    status: watch::Sender<Status>,
    session: Mutex<SessionState>,
    monitor: Arc<HeartbeatMonitor>,
    router: EventRouter,
    subscriptions: SubscriptionManager,
    cache: Arc<MemberCache>,
    control: Mutex<Control>,
    current_user: RwLock<Option<User>>,
}

impl Shared {
    /// Move to `next`, logging transitions the state machine does not expect
    fn set_state(&self, next: ConnectionState) {
        self.status.send_modify(|status| {
            let current = status.state;
            if current == next {
                return;
            }
            if !current.can_transition_to(next) {
                tracing::warn!(from = %current, to = %next, "Unexpected state transition");
            }
            tracing::debug!(from = %current, to = %next, "Connection state changed");
            status.state = next;
        });
    }

    /// Publish the end of a supervisor run
    fn stop(&self, error: GatewayError) {
        self.status.send_modify(|status| {
            tracing::debug!(from = %status.state, error = %error, "Supervisor stopped");
            status.state = ConnectionState::Disconnected;
            status.error = Some(error);
        });
    }

    /// Forget everything tied to the account
    fn clear_account(&self) {
        self.cache.clear();
        self.session.lock().invalidate();
        *self.current_user.write() = None;
    }
}

/// Gateway client handle
#[derive(Clone)]
pub struct GatewayClient {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("state", &self.state())
            .field("url", &self.shared.config.gateway.url)
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Create a client that opens sockets through `connector`
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let cache = Arc::new(MemberCache::new());
        let (status, _) = watch::channel(Status::default());
        let shared = Shared {
            router: EventRouter::new(config.events.buffer_size),
            subscriptions: SubscriptionManager::new(
                cache.clone(),
                config.members.max_ids_per_request,
            ),
            cache,
            connector,
            status,
            session: Mutex::new(SessionState::new()),
            monitor: Arc::new(HeartbeatMonitor::new()),
            control: Mutex::new(Control::default()),
            current_user: RwLock::new(None),
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Create a client using the WebSocket transport
    pub fn with_tungstenite(config: ClientConfig) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector))
    }

    /// Start the supervisor
    ///
    /// Resolves once the first successful connection has received Hello and
    /// sent Identify or Resume, or with the terminal error if the supervisor
    /// gives up first. Readiness is awaited separately.
    pub async fn connect(&self, token: impl Into<String>) -> GatewayResult<()> {
        let mut status = self.shared.status.subscribe();
        {
            let mut control = self.shared.control.lock();
            if control.task.as_ref().is_some_and(|task| !task.is_finished()) {
                return Err(GatewayError::AlreadyConnected);
            }

            self.shared.status.send_modify(|s| s.error = None);
            self.shared.set_state(ConnectionState::Connecting);

            let cancel = CancellationToken::new();
            let runner = Runner::new(self.shared.clone(), token.into(), cancel.clone());
            control.task = Some(tokio::spawn(runner.run()));
            control.cancel = Some(cancel);
        }

        let status = status
            .wait_for(|s| {
                matches!(
                    s.state,
                    ConnectionState::Identifying | ConnectionState::Resuming | ConnectionState::Ready
                ) || s.is_stopped()
            })
            .await
            .map_err(|_| GatewayError::Closed)?;
        match &status.error {
            Some(error) if status.state == ConnectionState::Disconnected => Err(error.clone()),
            _ => Ok(()),
        }
    }

    /// Close the connection with a normal close code
    ///
    /// Cancels the heartbeat, any pending backoff and any connect attempt in
    /// flight, then waits for the supervisor to stop. No reconnect happens
    /// afterwards.
    pub async fn close(&self) -> GatewayResult<()> {
        let (cancel, task) = {
            let mut control = self.shared.control.lock();
            (control.cancel.take(), control.task.take())
        };
        let Some(task) = task else {
            return Ok(());
        };
        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Supervisor task failed");
        }
        Ok(())
    }

    /// Close and forget the account: member cache, session and current user
    pub async fn logout(&self) -> GatewayResult<()> {
        self.close().await?;
        self.shared.clear_account();
        tracing::info!("Logged out");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.borrow().state
    }

    /// Handle for collaborators that must wait for a live session
    pub fn readiness(&self) -> ReadinessGate {
        ReadinessGate::new(self.shared.status.subscribe())
    }

    pub async fn wait_until_ready(&self) -> GatewayResult<()> {
        self.readiness().wait_ready().await
    }

    /// Snapshot of the resumable session
    pub fn session(&self) -> SessionState {
        self.shared.session.lock().clone()
    }

    /// Round trip of the last acknowledged heartbeat
    pub fn latency(&self) -> Option<Duration> {
        self.shared.monitor.latency()
    }

    /// Account the session belongs to, once READY has been received
    pub fn current_user(&self) -> Option<User> {
        self.shared.current_user.read().clone()
    }

    pub fn lookup_member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<GuildMember> {
        self.shared.cache.get(guild_id, user_id)
    }

    /// Read-only view of the member cache
    pub fn members(&self) -> &MemberCache {
        &self.shared.cache
    }

    pub fn events(&self) -> &EventRouter {
        &self.shared.router
    }

    pub async fn subscribe(&self, guild_id: Snowflake, range: MemberRange) -> GatewayResult<bool> {
        self.shared.subscriptions.subscribe(guild_id, range).await
    }

    pub async fn subscribe_to_dm(&self, channel_id: Snowflake) -> GatewayResult<bool> {
        self.shared.subscriptions.subscribe_to_dm(channel_id).await
    }

    pub async fn get_members(
        &self,
        guild_id: Snowflake,
        user_ids: impl IntoIterator<Item = Snowflake>,
    ) -> GatewayResult<MemberLookup> {
        self.shared
            .subscriptions
            .get_members(guild_id, user_ids)
            .await
    }

    pub async fn member_list(
        &self,
        channel_id: Snowflake,
        guild_id: Snowflake,
    ) -> GatewayResult<bool> {
        self.shared
            .subscriptions
            .member_list(channel_id, guild_id)
            .await
    }
}
