use serde::{Deserialize, Serialize};

use super::bounds::RegionBounds;
use super::mutation::{DataUpdate, PrivateUpdate};

/// Which request a subscription ack/nack answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOp {
    Subscribe,
    Unsubscribe,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Handshake accepted
    AuthSuccess {
        /// Server-side session identifier, if the server exposes one
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Handshake rejected, or credential revoked mid-session
    AuthError {
        message: String,
    },

    /// Insert/update/delete of one entity
    DataUpdate(DataUpdate),

    /// User-scoped notification
    PrivateUpdate(PrivateUpdate),

    /// Server confirmed a subscribe/unsubscribe request
    SubscriptionAck {
        op: SubscriptionOp,
        bounds: RegionBounds,
    },

    /// Server rejected a subscribe/unsubscribe request
    SubscriptionNack {
        op: SubscriptionOp,
        bounds: RegionBounds,
        #[serde(default)]
        reason: String,
    },

    /// Answer to `heartbeat_ping`
    HeartbeatAck {
        #[serde(default)]
        server_timestamp: Option<i64>,
    },

    /// Server is terminating the session on purpose
    Disconnect {
        #[serde(default)]
        reason: Option<String>,
    },
}
