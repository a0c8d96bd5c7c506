//! Connection state machine states and the status snapshot derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the connection manager.
///
/// `Reconnecting` is the sub-state of a retryable `Disconnected` while
/// automatic retries are in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Client called `disconnect()`. Nothing runs until the next `connect()`.
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {})", attempt),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Immutable connection status snapshot, published on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub connecting: bool,
    pub error: Option<String>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Automatic retry counter; reset to 0 on a successful connect.
    #[serde(default)]
    pub retry_count: u32,
    /// The last heartbeat ping has not been acknowledged yet.
    #[serde(default)]
    pub heartbeat_overdue: bool,
    #[serde(default)]
    pub state: ConnectionState,
}

impl ConnectionStatus {
    /// Derive a snapshot from the manager's current state.
    pub fn derive(
        state: ConnectionState,
        error: Option<String>,
        retry_count: u32,
        last_heartbeat_at: Option<DateTime<Utc>>,
        heartbeat_overdue: bool,
    ) -> Self {
        Self {
            connected: state.is_connected(),
            connecting: state.is_connecting(),
            error,
            last_heartbeat_at,
            retry_count,
            heartbeat_overdue: state.is_connected() && heartbeat_overdue,
            state,
        }
    }
}
