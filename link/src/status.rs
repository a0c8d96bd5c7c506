//! Connection status snapshots.
//!
//! [`StatusPublisher`] is owned by the connection task. Every transition,
//! heartbeat acknowledgement and overdue tick produces a fresh
//! [`ConnectionStatus`] which is stored in a `watch` channel and dispatched on
//! the `connection-status` topic.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use crate::event_router::EventRouter;
use crate::models::{topics, ConnectionState, ConnectionStatus};

pub struct StatusPublisher {
    router: Arc<EventRouter>,
    tx: watch::Sender<ConnectionStatus>,
    state: ConnectionState,
    error: Option<String>,
    retry_count: u32,
    last_heartbeat_at: Option<DateTime<Utc>>,
    heartbeat_overdue: bool,
}

impl StatusPublisher {
    pub fn new(router: Arc<EventRouter>) -> Self {
        let (tx, _rx) = watch::channel(ConnectionStatus::default());
        Self {
            router,
            tx,
            state: ConnectionState::Disconnected,
            error: None,
            retry_count: 0,
            last_heartbeat_at: None,
            heartbeat_overdue: false,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn current(&self) -> ConnectionStatus {
        self.tx.borrow().clone()
    }

    /// Move to `state` and publish. Entering `Connected` clears the error and
    /// the overdue flag.
    pub fn transition(&mut self, state: ConnectionState, error: Option<String>, retry_count: u32) {
        if state.is_connected() {
            self.heartbeat_overdue = false;
        }
        log::debug!(
            "[atlas-link] Status {} -> {} (retry {}, error: {:?})",
            self.state,
            state,
            retry_count,
            error
        );
        self.state = state;
        self.error = error;
        self.retry_count = retry_count;
        self.publish();
    }

    pub fn heartbeat_acknowledged(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat_at = Some(at);
        self.heartbeat_overdue = false;
        self.publish();
    }

    pub fn heartbeat_overdue(&mut self) {
        self.heartbeat_overdue = true;
        self.publish();
    }

    fn publish(&self) {
        let snapshot = ConnectionStatus::derive(
            self.state,
            self.error.clone(),
            self.retry_count,
            self.last_heartbeat_at,
            self.heartbeat_overdue,
        );
        // Store first so handlers calling `status()` see the snapshot they receive.
        self.tx.send_replace(snapshot.clone());
        match serde_json::to_value(&snapshot) {
            Ok(payload) => {
                self.router.dispatch(topics::CONNECTION_STATUS, payload);
            },
            Err(e) => log::error!("[atlas-link] Failed to serialize status: {}", e),
        }
    }
}
