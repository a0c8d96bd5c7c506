use serde::{Deserialize, Serialize};

use super::bounds::RegionBounds;

/// Client-to-server request messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate the socket.
    ///
    /// Sent immediately after the socket opens; the server answers with
    /// `auth_success` or `auth_error`.
    Authenticate {
        /// Opaque credential supplied by the auth provider
        token: String,
    },

    /// Start receiving notifications for a region
    SubscribeRegion {
        bounds: RegionBounds,
    },

    /// Stop receiving notifications for a region
    UnsubscribeRegion {
        bounds: RegionBounds,
    },

    /// Application-level keepalive
    HeartbeatPing {},
}

impl ClientMessage {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::SubscribeRegion { .. } => "subscribe_region",
            Self::UnsubscribeRegion { .. } => "unsubscribe_region",
            Self::HeartbeatPing {} => "heartbeat_ping",
        }
    }
}
