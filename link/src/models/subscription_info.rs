//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] provides a read-only snapshot of one registry entry,
//! useful for debugging, tests and status dashboards.

use serde::{Deserialize, Serialize};

use super::bounds::RegionBounds;

/// Read-only snapshot of a region subscription.
///
/// Returned by [`AtlasLinkClient::subscriptions()`](crate::AtlasLinkClient::subscriptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub bounds: RegionBounds,
    /// `false` once `unsubscribe()` was called and the server has not yet
    /// confirmed, or after the server rejected the subscribe request.
    pub active: bool,
    /// Reason supplied by the server in a `subscription_nack`.
    pub rejected: Option<String>,
    /// Millis since Unix epoch when the entry was (re)activated.
    pub created_at_ms: u64,
    /// How many times the subscribe request was sent, replays included.
    pub send_count: u32,
}
