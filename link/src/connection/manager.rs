//! The connection manager: one background task owning the session.
//!
//! The public [`ConnectionManager`] handle only sends commands. The task
//! owns the transport, the [`SubscriptionRegistry`], the timers and the
//! [`StatusPublisher`], so every state change and every dispatch happens on
//! that one task.
//!
//! Handshakes run on a spawned future tagged with a token. A result whose
//! token is no longer current (superseded by `disconnect()` or a newer
//! `connect()`) is discarded and its transport closed.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, watch};

use super::backoff::Backoff;
use super::timers::{ConnectionTimers, TimerEvent};
use super::transport::{CloseCause, Connector, Framing, Transport, TransportEvent};
use crate::auth::{Credential, ResolvedAuth};
use crate::error::{AtlasLinkError, Result};
use crate::event_router::EventRouter;
use crate::models::{
    topics, ClientMessage, ConnectionOptions, ConnectionState, ConnectionStatus, EventEnvelope,
    RegionBounds, ServerMessage, SubscriptionInfo, TransportPreference,
};
use crate::status::StatusPublisher;
use crate::subscription::{RegistryAction, SubscriptionRegistry};
use crate::timeouts::{with_timeout, LinkTimeouts};

const COMMAND_CHANNEL_CAPACITY: usize = 256;

/// Status error surfaced when the server ends the session on purpose.
pub const SERVER_CLOSE_MESSAGE: &str = "disconnected by server";

/// Identity of one established session. Increases with every handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

enum ManagerCmd {
    /// `credential: None` is `reconnect()`.
    Connect {
        credential: Option<Credential>,
        result_tx: oneshot::Sender<Result<SessionId>>,
    },
    Disconnect {
        done_tx: oneshot::Sender<()>,
    },
    Subscribe {
        bounds: RegionBounds,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Unsubscribe {
        bounds: RegionBounds,
        result_tx: oneshot::Sender<Result<()>>,
    },
    ListSubscriptions {
        result_tx: oneshot::Sender<Vec<SubscriptionInfo>>,
    },
    Shutdown {
        done_tx: Option<oneshot::Sender<()>>,
    },
}

// ── ConnectionManager (public handle) ───────────────────────────────────────

struct ManagerInner {
    cmd_tx: mpsc::Sender<ManagerCmd>,
    status_rx: watch::Receiver<ConnectionStatus>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(ManagerCmd::Shutdown { done_tx: None });
    }
}

/// Handle to the background connection task. Cheap to clone; the task shuts
/// down when the last clone is dropped.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

/// Non-owning handle, used by background helpers that must not keep the
/// task alive.
#[derive(Clone)]
pub(crate) struct WeakConnectionManager {
    inner: Weak<ManagerInner>,
}

impl WeakConnectionManager {
    pub(crate) fn upgrade(&self) -> Option<ConnectionManager> {
        self.inner.upgrade().map(|inner| ConnectionManager { inner })
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager").field("status", &self.status()).finish()
    }
}

impl ConnectionManager {
    /// Spawn the connection task. Must be called inside a tokio runtime.
    ///
    /// Nothing connects until [`connect`](Self::connect) or
    /// [`reconnect`](Self::reconnect) is called.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        router: Arc<EventRouter>,
        options: ConnectionOptions,
        timeouts: LinkTimeouts,
        auth: ResolvedAuth,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (handshake_tx, handshake_rx) = mpsc::unbounded_channel();
        let status = StatusPublisher::new(router.clone());
        let status_rx = status.subscribe();

        let task = ConnectionTask {
            cmd_rx,
            handshake_tx,
            handshake_rx,
            connector,
            router,
            backoff: Backoff::from_options(&options),
            options,
            timeouts,
            auth,
            status,
            registry: SubscriptionRegistry::new(),
            timers: ConnectionTimers::new(),
            transport: None,
            session: None,
            session_credential: None,
            token: 0,
            pending: None,
            attempt: 0,
            awaiting_heartbeat_ack: false,
        };
        tokio::spawn(task.run());

        Self {
            inner: Arc::new(ManagerInner { cmd_tx, status_rx }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            inner: Arc::downgrade(&self.inner),
        }
    }

    async fn send_cmd(&self, cmd: ManagerCmd) -> Result<()> {
        self.inner
            .cmd_tx
            .send(cmd)
            .await
            .map_err(|_| AtlasLinkError::InternalError("Connection task is not running".to_string()))
    }

    /// Authenticate and establish a session.
    ///
    /// Joins a handshake already in flight for the same credential. Returns
    /// the current session when already connected with `credential`.
    pub async fn connect(&self, credential: Credential) -> Result<SessionId> {
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(ManagerCmd::Connect {
            credential: Some(credential),
            result_tx,
        })
        .await?;
        result_rx.await.map_err(|_| {
            AtlasLinkError::InternalError("Connection task died before connecting".to_string())
        })?
    }

    /// Resume with the last credential (or a fresh one from the dynamic
    /// provider) after retries were exhausted or after `disconnect()`.
    pub async fn reconnect(&self) -> Result<SessionId> {
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(ManagerCmd::Connect {
            credential: None,
            result_tx,
        })
        .await?;
        result_rx.await.map_err(|_| {
            AtlasLinkError::InternalError("Connection task died before reconnecting".to_string())
        })?
    }

    /// Close the session and stop all timers. Never auto-reconnects.
    pub async fn disconnect(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send_cmd(ManagerCmd::Disconnect { done_tx }).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Disconnect and stop the background task.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .send_cmd(ManagerCmd::Shutdown {
                done_tx: Some(done_tx),
            })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Record interest in `bounds`; sent now if connected, else on the next
    /// successful connect.
    pub async fn subscribe(&self, bounds: RegionBounds) -> Result<()> {
        bounds.validate()?;
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(ManagerCmd::Subscribe { bounds, result_tx }).await?;
        result_rx.await.map_err(|_| {
            AtlasLinkError::InternalError("Connection task died before subscribing".to_string())
        })?
    }

    pub async fn unsubscribe(&self, bounds: RegionBounds) -> Result<()> {
        bounds.validate()?;
        let (result_tx, result_rx) = oneshot::channel();
        self.send_cmd(ManagerCmd::Unsubscribe { bounds, result_tx }).await?;
        result_rx.await.map_err(|_| {
            AtlasLinkError::InternalError("Connection task died before unsubscribing".to_string())
        })?
    }

    pub async fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        let (result_tx, result_rx) = oneshot::channel();
        if self.send_cmd(ManagerCmd::ListSubscriptions { result_tx }).await.is_err() {
            return Vec::new();
        }
        result_rx.await.unwrap_or_default()
    }

    /// Latest status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status_rx.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_rx.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status_rx.borrow().connected
    }
}

// ── Handshake ───────────────────────────────────────────────────────────────

/// Where the handshake gets its credential.
enum CredentialSource {
    Given(Credential),
    Resolve(ResolvedAuth),
}

struct Established {
    transport: Box<dyn Transport>,
    credential: Credential,
}

struct HandshakeOutcome {
    token: u64,
    result: Result<Established>,
}

struct PendingHandshake {
    token: u64,
    /// `None` while the credential is being resolved by the provider.
    credential: Option<Credential>,
    waiters: Vec<oneshot::Sender<Result<SessionId>>>,
    /// Part of an automatic retry cycle.
    retry: bool,
}

async fn perform_handshake(
    connector: Arc<dyn Connector>,
    source: CredentialSource,
    preference: TransportPreference,
    timeouts: LinkTimeouts,
) -> Result<Established> {
    let credential = match source {
        CredentialSource::Given(c) => c,
        CredentialSource::Resolve(auth) => auth.resolve().await?,
    };

    let transport = match preference {
        TransportPreference::Message => {
            open_and_authenticate(&*connector, Framing::Message, &credential, &timeouts).await?
        },
        TransportPreference::Degraded => {
            open_and_authenticate(&*connector, Framing::Degraded, &credential, &timeouts).await?
        },
        TransportPreference::Auto => {
            match open_and_authenticate(&*connector, Framing::Message, &credential, &timeouts).await {
                Ok(t) => t,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    log::warn!(
                        "[atlas-link] Message transport failed ({}); falling back to degraded",
                        e
                    );
                    open_and_authenticate(&*connector, Framing::Degraded, &credential, &timeouts)
                        .await?
                },
            }
        },
    };

    Ok(Established {
        transport,
        credential,
    })
}

async fn open_and_authenticate(
    connector: &dyn Connector,
    framing: Framing,
    credential: &Credential,
    timeouts: &LinkTimeouts,
) -> Result<Box<dyn Transport>> {
    let mut transport =
        with_timeout(timeouts.connection_timeout, "Connection", connector.open(framing)).await?;

    let auth = ClientMessage::Authenticate {
        token: credential.expose().to_string(),
    };
    let result = async {
        with_timeout(timeouts.send_timeout, "Send authenticate", transport.send(&auth)).await?;
        with_timeout(timeouts.auth_timeout, "Authentication", wait_for_auth(&mut *transport)).await
    }
    .await;

    match result {
        Ok(()) => Ok(transport),
        Err(e) => {
            transport.close().await;
            Err(e)
        },
    }
}

/// Wait for `auth_success` / `auth_error`, tolerating other messages.
async fn wait_for_auth(transport: &mut dyn Transport) -> Result<()> {
    loop {
        match transport.next_event().await {
            TransportEvent::Message(ServerMessage::AuthSuccess { session_id }) => {
                log::info!(
                    "[atlas-link] Authenticated (server session: {})",
                    session_id.as_deref().unwrap_or("-")
                );
                return Ok(());
            },
            TransportEvent::Message(ServerMessage::AuthError { message }) => {
                return Err(AtlasLinkError::AuthenticationError(message));
            },
            TransportEvent::Message(other) => {
                log::debug!("[atlas-link] Ignoring {:?} during authentication", other);
            },
            TransportEvent::Closed(CloseCause::Server(reason)) => {
                return Err(AtlasLinkError::ServerClose(reason));
            },
            TransportEvent::Closed(cause) => {
                return Err(AtlasLinkError::TransportError(format!(
                    "Connection closed during authentication: {}",
                    cause
                )));
            },
        }
    }
}

/// Poll the transport, or wait forever when there is none.
async fn next_transport_event(transport: &mut Option<Box<dyn Transport>>) -> TransportEvent {
    match transport.as_mut() {
        Some(t) => t.next_event().await,
        None => std::future::pending().await,
    }
}

// ── Background connection task ──────────────────────────────────────────────

enum Flow {
    Continue,
    Exit,
}

struct ConnectionTask {
    cmd_rx: mpsc::Receiver<ManagerCmd>,
    handshake_tx: mpsc::UnboundedSender<HandshakeOutcome>,
    handshake_rx: mpsc::UnboundedReceiver<HandshakeOutcome>,
    connector: Arc<dyn Connector>,
    router: Arc<EventRouter>,
    options: ConnectionOptions,
    timeouts: LinkTimeouts,
    backoff: Backoff,
    /// Source for `reconnect()` and automatic retries.
    auth: ResolvedAuth,
    status: StatusPublisher,
    registry: SubscriptionRegistry,
    timers: ConnectionTimers,
    transport: Option<Box<dyn Transport>>,
    session: Option<SessionId>,
    session_credential: Option<Credential>,
    /// Current handshake token; anything tagged otherwise is stale.
    token: u64,
    pending: Option<PendingHandshake>,
    /// Current retry number, 0 when not retrying.
    attempt: u32,
    awaiting_heartbeat_ack: bool,
}

impl ConnectionTask {
    async fn run(mut self) {
        log::debug!("[atlas-link] Connection task started");
        loop {
            let flow = tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.teardown().await;
                        Flow::Exit
                    },
                },

                Some(outcome) = self.handshake_rx.recv() => {
                    self.handle_handshake(outcome).await;
                    Flow::Continue
                }

                fired = self.timers.fired() => {
                    match fired {
                        TimerEvent::BackoffElapsed => self.start_retry(),
                        TimerEvent::Heartbeat => self.heartbeat_tick().await,
                    }
                    Flow::Continue
                }

                event = next_transport_event(&mut self.transport) => {
                    self.handle_transport_event(event).await;
                    Flow::Continue
                }
            };
            if matches!(flow, Flow::Exit) {
                break;
            }
        }
        log::debug!("[atlas-link] Connection task stopped");
    }

    // ── Commands ────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: ManagerCmd) -> Flow {
        match cmd {
            ManagerCmd::Connect {
                credential,
                result_tx,
            } => self.connect(credential, result_tx).await,
            ManagerCmd::Disconnect { done_tx } => {
                self.teardown().await;
                let _ = done_tx.send(());
            },
            ManagerCmd::Subscribe { bounds, result_tx } => {
                let result = self.subscribe(bounds).await;
                let _ = result_tx.send(result);
            },
            ManagerCmd::Unsubscribe { bounds, result_tx } => {
                let result = self.unsubscribe(bounds).await;
                let _ = result_tx.send(result);
            },
            ManagerCmd::ListSubscriptions { result_tx } => {
                let _ = result_tx.send(self.registry.snapshot());
            },
            ManagerCmd::Shutdown { done_tx } => {
                self.teardown().await;
                if let Some(tx) = done_tx {
                    let _ = tx.send(());
                }
                return Flow::Exit;
            },
        }
        Flow::Continue
    }

    async fn connect(
        &mut self,
        credential: Option<Credential>,
        result_tx: oneshot::Sender<Result<SessionId>>,
    ) {
        // Already connected with this credential.
        if let (Some(session), true) = (self.session, self.transport.is_some()) {
            let same = match &credential {
                Some(c) => self.session_credential.as_ref() == Some(c),
                None => true,
            };
            if same {
                let _ = result_tx.send(Ok(session));
                return;
            }
        }

        // A handshake is in flight: join it unless the credential changed.
        if let Some(pending) = self.pending.as_mut() {
            let joinable = match &credential {
                None => true,
                Some(c) => pending.credential.as_ref() == Some(c),
            };
            if joinable {
                log::debug!("[atlas-link] Joining handshake {}", pending.token);
                pending.retry = false;
                pending.waiters.push(result_tx);
                return;
            }
        }

        let source = match credential {
            Some(c) => {
                if !matches!(self.auth, ResolvedAuth::Dynamic(_)) {
                    self.auth = ResolvedAuth::Static(c.clone());
                }
                CredentialSource::Given(c)
            },
            None => {
                if self.auth.is_none() {
                    let _ = result_tx.send(Err(AtlasLinkError::ConfigurationError(
                        "reconnect() called before any credential was supplied".to_string(),
                    )));
                    return;
                }
                CredentialSource::Resolve(self.auth.clone())
            },
        };

        // Superseding: close the live session, cancel retries and pending
        // handshakes.
        self.cancel_pending("Superseded by a newer connect()");
        self.close_transport().await;
        self.timers.stop();
        self.attempt = 0;

        self.start_handshake(source, vec![result_tx], false);
    }

    async fn subscribe(&mut self, bounds: RegionBounds) -> Result<()> {
        if self.registry.subscribe(bounds)? == RegistryAction::Send && self.transport.is_some() {
            self.registry.mark_sent(&bounds);
            if let Err(e) = self.send(&ClientMessage::SubscribeRegion { bounds }).await {
                // Intent is kept; replayed on the next session.
                self.on_transport_loss(e.to_string()).await;
            }
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, bounds: RegionBounds) -> Result<()> {
        let connected = self.transport.is_some();
        if self.registry.unsubscribe(bounds, connected)? == RegistryAction::Send {
            if let Err(e) = self.send(&ClientMessage::UnsubscribeRegion { bounds }).await {
                self.on_transport_loss(e.to_string()).await;
            }
        }
        Ok(())
    }

    /// Client-initiated close. Terminal until the next connect.
    async fn teardown(&mut self) {
        self.timers.stop();
        self.token += 1;
        self.cancel_pending("Cancelled by disconnect()");
        self.close_transport().await;
        self.attempt = 0;
        if self.status.state() != ConnectionState::Closed {
            log::info!("[atlas-link] Disconnected by client");
            self.status.transition(ConnectionState::Closed, None, 0);
        }
    }

    // ── Handshake lifecycle ─────────────────────────────────────────────────

    fn start_handshake(
        &mut self,
        source: CredentialSource,
        waiters: Vec<oneshot::Sender<Result<SessionId>>>,
        retry: bool,
    ) {
        self.timers.cancel_backoff();
        self.token += 1;
        let token = self.token;
        let credential = match &source {
            CredentialSource::Given(c) => Some(c.clone()),
            CredentialSource::Resolve(ResolvedAuth::Static(c)) => Some(c.clone()),
            CredentialSource::Resolve(_) => None,
        };
        self.pending = Some(PendingHandshake {
            token,
            credential,
            waiters,
            retry,
        });

        if !retry {
            self.status.transition(ConnectionState::Connecting, None, 0);
        }

        log::debug!("[atlas-link] Starting handshake {} (retry: {})", token, retry);
        let connector = self.connector.clone();
        let preference = self.options.transport;
        let timeouts = self.timeouts.clone();
        let tx = self.handshake_tx.clone();
        tokio::spawn(async move {
            let result = perform_handshake(connector, source, preference, timeouts).await;
            if let Err(returned) = tx.send(HandshakeOutcome { token, result }) {
                // Task is gone; do not leak the socket.
                if let Ok(mut est) = returned.0.result {
                    est.transport.close().await;
                }
            }
        });
    }

    fn start_retry(&mut self) {
        log::info!(
            "[atlas-link] Reconnection attempt {} of {}",
            self.attempt,
            self.backoff.max_attempts()
        );
        let source = CredentialSource::Resolve(self.auth.clone());
        self.start_handshake(source, Vec::new(), true);
    }

    fn cancel_pending(&mut self, reason: &str) {
        if let Some(pending) = self.pending.take() {
            for waiter in pending.waiters {
                let _ = waiter.send(Err(AtlasLinkError::Cancelled(reason.to_string())));
            }
        }
    }

    async fn handle_handshake(&mut self, outcome: HandshakeOutcome) {
        let current = self.pending.as_ref().is_some_and(|p| p.token == outcome.token);
        if !current || outcome.token != self.token {
            log::debug!("[atlas-link] Discarding stale handshake {}", outcome.token);
            if let Ok(mut est) = outcome.result {
                est.transport.close().await;
            }
            return;
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        match outcome.result {
            Ok(est) => self.on_established(est, pending).await,
            Err(e) => self.on_handshake_failed(e, pending),
        }
    }

    async fn on_established(&mut self, est: Established, pending: PendingHandshake) {
        let session = SessionId(pending.token);
        self.transport = Some(est.transport);
        self.session = Some(session);
        self.session_credential = Some(est.credential);
        self.attempt = 0;
        self.awaiting_heartbeat_ack = false;

        let purged = self.registry.purge_inactive();
        if purged > 0 {
            log::debug!("[atlas-link] Purged {} inactive subscription(s)", purged);
        }

        log::info!("[atlas-link] Connected ({})", session);
        self.status.transition(ConnectionState::Connected, None, 0);
        if let Some(period) = self.options.heartbeat_interval() {
            self.timers.start_heartbeat(period);
        }
        for waiter in pending.waiters {
            let _ = waiter.send(Ok(session));
        }

        self.replay_subscriptions().await;
    }

    async fn replay_subscriptions(&mut self) {
        let active = self.registry.active_bounds();
        if active.is_empty() {
            return;
        }
        log::info!("[atlas-link] Re-subscribing {} region(s)", active.len());
        for bounds in active {
            self.registry.mark_sent(&bounds);
            if let Err(e) = self.send(&ClientMessage::SubscribeRegion { bounds }).await {
                log::warn!("[atlas-link] Failed to re-subscribe {}: {}", bounds, e);
                self.on_transport_loss(e.to_string()).await;
                return;
            }
        }
    }

    fn on_handshake_failed(&mut self, error: AtlasLinkError, pending: PendingHandshake) {
        log::warn!("[atlas-link] Handshake {} failed: {}", pending.token, error);
        for waiter in pending.waiters {
            let _ = waiter.send(Err(error.clone()));
        }

        if let AtlasLinkError::ServerClose(_) = error {
            self.timers.stop();
            self.attempt = 0;
            self.status.transition(
                ConnectionState::Disconnected,
                Some(SERVER_CLOSE_MESSAGE.to_string()),
                0,
            );
            return;
        }

        if pending.retry && error.is_retryable() {
            self.schedule_next_retry();
            return;
        }

        // Auth rejections, provider failures and failed direct connects end here.
        self.timers.stop();
        let retry_count = self.attempt;
        self.attempt = 0;
        self.status.transition(ConnectionState::Disconnected, Some(error.to_string()), retry_count);
    }

    /// After a failed retry: back off again, or give up.
    fn schedule_next_retry(&mut self) {
        let next = self.attempt + 1;
        if self.backoff.allows(next) {
            self.attempt = next;
            let message = format!(
                "Reconnecting (attempt {} of {})",
                next,
                self.backoff.max_attempts()
            );
            self.status.transition(ConnectionState::Reconnecting { attempt: next }, Some(message), next);
            self.timers.schedule_backoff(self.backoff.delay_for(next));
        } else {
            self.give_up();
        }
    }

    fn give_up(&mut self) {
        let attempts = self.attempt;
        log::warn!("[atlas-link] Giving up after {} reconnection attempt(s)", attempts);
        self.timers.stop();
        self.status.transition(
            ConnectionState::Disconnected,
            Some(format!("Reconnection failed after {} attempts", attempts)),
            attempts,
        );
    }

    // ── Live session ────────────────────────────────────────────────────────

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(AtlasLinkError::TransportError("Not connected".to_string()));
        };
        with_timeout(self.timeouts.send_timeout, message.kind(), transport.send(message)).await
    }

    async fn close_transport(&mut self) {
        self.timers.stop_heartbeat();
        self.awaiting_heartbeat_ack = false;
        self.session = None;
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
    }

    async fn heartbeat_tick(&mut self) {
        if self.transport.is_none() {
            return;
        }
        if self.awaiting_heartbeat_ack {
            log::warn!("[atlas-link] Heartbeat not acknowledged");
            self.status.heartbeat_overdue();
        }
        match self.send(&ClientMessage::HeartbeatPing {}).await {
            Ok(()) => self.awaiting_heartbeat_ack = true,
            Err(e) => self.on_transport_loss(format!("Heartbeat failed: {}", e)).await,
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => self.handle_server_message(msg).await,
            TransportEvent::Closed(CloseCause::Server(reason)) => self.on_server_close(&reason).await,
            TransportEvent::Closed(CloseCause::Lost(reason)) => self.on_transport_loss(reason).await,
        }
    }

    async fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::DataUpdate(update) => {
                let ts = update.timestamp;
                self.dispatch(topics::DATA_UPDATE, &update, ts);
            },
            ServerMessage::PrivateUpdate(update) => {
                let ts = update.timestamp;
                self.dispatch(topics::PRIVATE_UPDATE, &update, ts);
            },
            ServerMessage::SubscriptionAck { op, bounds } => {
                self.registry.confirm(op, &bounds);
                self.dispatch(topics::SUBSCRIPTION_ACK, &json!({ "op": op, "bounds": bounds }), None);
            },
            ServerMessage::SubscriptionNack { op, bounds, reason } => {
                let err = AtlasLinkError::SubscriptionError(format!("{} rejected: {}", bounds, reason));
                log::warn!("[atlas-link] {}", err);
                self.registry.reject(op, &bounds, &reason);
                self.dispatch(
                    topics::SUBSCRIPTION_NACK,
                    &json!({ "op": op, "bounds": bounds, "reason": reason }),
                    None,
                );
            },
            ServerMessage::HeartbeatAck { server_timestamp } => {
                log::trace!("[atlas-link] Heartbeat ack (server ts {:?})", server_timestamp);
                self.awaiting_heartbeat_ack = false;
                self.status.heartbeat_acknowledged(Utc::now());
            },
            ServerMessage::Disconnect { reason } => {
                let reason = reason.unwrap_or_else(|| "no reason given".to_string());
                self.on_server_close(&reason).await;
            },
            ServerMessage::AuthError { message } => {
                let err = AtlasLinkError::AuthenticationError(message);
                log::warn!("[atlas-link] {}", err);
                self.close_transport().await;
                self.timers.stop();
                self.status.transition(ConnectionState::Disconnected, Some(err.to_string()), 0);
            },
            ServerMessage::AuthSuccess { .. } => {
                log::debug!("[atlas-link] Ignoring auth_success on an established session");
            },
        }
    }

    fn dispatch<T: Serialize>(&self, topic: &str, payload: &T, server_timestamp: Option<i64>) {
        match serde_json::to_value(payload) {
            Ok(payload) => {
                let envelope = EventEnvelope::new(topic, payload).with_server_timestamp(server_timestamp);
                let report = self.router.dispatch_envelope(&envelope);
                if report.failed > 0 {
                    log::debug!("[atlas-link] '{}' dispatch: {:?}", topic, report);
                }
            },
            Err(e) => log::error!("[atlas-link] Failed to encode '{}' payload: {}", topic, e),
        }
    }

    async fn on_server_close(&mut self, reason: &str) {
        log::info!("[atlas-link] Server closed the session: {}", reason);
        self.close_transport().await;
        self.timers.stop();
        self.attempt = 0;
        self.status.transition(
            ConnectionState::Disconnected,
            Some(SERVER_CLOSE_MESSAGE.to_string()),
            0,
        );
    }

    /// Unexpected loss of a live session: start the retry cycle.
    async fn on_transport_loss(&mut self, reason: String) {
        if self.transport.is_none() {
            return;
        }
        log::warn!("[atlas-link] Connection lost: {}", reason);
        self.close_transport().await;

        if !self.backoff.allows(1) {
            self.attempt = 0;
            self.give_up();
            return;
        }

        self.attempt = 1;
        let message = format!("Connection lost: {}", reason);
        self.status.transition(ConnectionState::Reconnecting { attempt: 1 }, Some(message), 1);
        self.timers.schedule_backoff(self.backoff.delay_for(1));
    }
}
