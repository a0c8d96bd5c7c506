//! Scripted in-process server used by the integration tests.
//!
//! [`MockConnector`] hands out [`MockTransport`]s and keeps a [`ServerSide`]
//! handle for each one, so a test can push server messages, drop the socket
//! and inspect what the client sent on that specific session.

#![allow(dead_code)]

use async_trait::async_trait;
use atlas_link::{
    AtlasLinkClient, AtlasLinkError, ClientMessage, CloseCause, ConnectionOptions,
    ConnectionStatus, Connector, Framing, LinkTimeouts, RegionBounds, Result, ServerMessage,
    Transport, TransportEvent, TransportPreference,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// How the next `open()` behaves.
#[derive(Debug, Clone)]
pub enum OpenScript {
    /// Socket opens, `authenticate` is answered with `auth_success`.
    Accept,
    /// Socket opens, `authenticate` is answered with `auth_error`.
    RejectAuth(String),
    /// `open()` itself fails.
    Fail(AtlasLinkError),
    /// Wait, then behave like `Accept`.
    Delay(Duration),
}

/// Server half of one mock socket.
#[derive(Clone)]
pub struct ServerSide {
    pub framing: Framing,
    tx: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    closed: Arc<AtomicBool>,
}

impl ServerSide {
    pub fn push(&self, message: ServerMessage) {
        let _ = self.tx.send(TransportEvent::Message(message));
    }

    /// Simulate network loss.
    pub fn drop_connection(&self) {
        let _ = self.tx.send(TransportEvent::Closed(CloseCause::Lost("connection reset".into())));
    }

    /// Simulate the socket stream ending without a close frame.
    pub fn end_stream(&self) {
        let _ = self.tx.send(TransportEvent::Closed(CloseCause::Lost(
            atlas_link::connection::TRANSPORT_CLOSE.into(),
        )));
    }

    /// Simulate a close frame with a normal code.
    pub fn close_from_server(&self) {
        let _ = self.tx.send(TransportEvent::Closed(CloseCause::Server("going away".into())));
    }

    /// Everything the client sent on this socket, `authenticate` included.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().clone()
    }

    pub fn subscribes(&self) -> Vec<RegionBounds> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::SubscribeRegion { bounds } => Some(bounds),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.sent().iter().filter(|m| m.kind() == kind).count()
    }

    /// Whether the client closed this socket.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockTransport {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    server: ServerSide,
    reject_auth: Option<String>,
    ack_heartbeats: bool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        if self.server.is_closed() {
            return Err(AtlasLinkError::TransportError("socket closed".into()));
        }
        self.server.sent.lock().push(message.clone());
        match message {
            ClientMessage::Authenticate { .. } => match &self.reject_auth {
                Some(reason) => self.server.push(ServerMessage::AuthError {
                    message: reason.clone(),
                }),
                None => self.server.push(ServerMessage::AuthSuccess { session_id: None }),
            },
            ClientMessage::HeartbeatPing {} if self.ack_heartbeats => {
                self.server.push(ServerMessage::HeartbeatAck {
                    server_timestamp: Some(1_700_000_000_000),
                });
            },
            _ => {},
        }
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed(CloseCause::Lost("mock channel closed".into())),
        }
    }

    async fn close(&mut self) {
        self.server.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ConnectorState {
    script: VecDeque<OpenScript>,
    sessions: Vec<ServerSide>,
    opens: usize,
}

#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
    ack_heartbeats: Arc<AtomicBool>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectorState::default())),
            ack_heartbeats: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Queue behaviours for the next `open()` calls. Once the queue is empty
    /// every open is accepted.
    pub fn script(&self, steps: impl IntoIterator<Item = OpenScript>) {
        self.state.lock().script.extend(steps);
    }

    pub fn ack_heartbeats(&self, enabled: bool) {
        self.ack_heartbeats.store(enabled, Ordering::SeqCst);
    }

    /// Number of `open()` calls, failed ones included.
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Sockets that reached the authenticate step.
    pub fn sessions(&self) -> Vec<ServerSide> {
        self.state.lock().sessions.clone()
    }

    pub fn session(&self, index: usize) -> ServerSide {
        self.sessions()[index].clone()
    }

    pub fn last_session(&self) -> ServerSide {
        self.sessions().last().cloned().expect("no session opened")
    }

    /// Sockets the client has not closed.
    pub fn live_sessions(&self) -> usize {
        self.sessions().iter().filter(|s| !s.is_closed()).count()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, framing: Framing) -> Result<Box<dyn Transport>> {
        let step = {
            let mut state = self.state.lock();
            state.opens += 1;
            state.script.pop_front().unwrap_or(OpenScript::Accept)
        };

        let reject_auth = match step {
            OpenScript::Accept => None,
            OpenScript::RejectAuth(reason) => Some(reason),
            OpenScript::Fail(err) => return Err(err),
            OpenScript::Delay(delay) => {
                tokio::time::sleep(delay).await;
                None
            },
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let server = ServerSide {
            framing,
            tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
        };
        self.state.lock().sessions.push(server.clone());

        Ok(Box::new(MockTransport {
            rx,
            server,
            reject_auth,
            ack_heartbeats: self.ack_heartbeats.load(Ordering::SeqCst),
        }))
    }
}

pub fn region(n: f64) -> RegionBounds {
    RegionBounds::new(n + 1.0, n, n + 1.0, n)
}

/// Message framing only, fast retries, heartbeats off unless a test turns
/// them on.
pub fn test_options() -> ConnectionOptions {
    ConnectionOptions::default()
        .with_transport(TransportPreference::Message)
        .with_reconnect_delay_ms(100)
        .with_max_reconnect_delay_ms(1_000)
        .with_max_reconnect_attempts(3)
        .with_heartbeat_interval_ms(0)
}

pub fn client_with(connector: &MockConnector, options: ConnectionOptions) -> AtlasLinkClient {
    AtlasLinkClient::builder()
        .connector(Arc::new(connector.clone()))
        .connection_options(options)
        .timeouts(LinkTimeouts::fast())
        .build()
        .expect("client builds")
}

/// Wait until the published status satisfies `pred`.
pub async fn wait_for_status<F>(rx: &mut watch::Receiver<ConnectionStatus>, pred: F) -> ConnectionStatus
where
    F: FnMut(&ConnectionStatus) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(pred))
        .await
        .expect("timed out waiting for status")
        .expect("status channel closed")
        .clone()
}

/// Let the connection task drain its queues.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
