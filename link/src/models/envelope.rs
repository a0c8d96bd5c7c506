use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;

/// Router topic names.
pub mod topics {
    /// Server-pushed entity mutations.
    pub const DATA_UPDATE: &str = "data-update";
    /// Server-pushed user-scoped notifications.
    pub const PRIVATE_UPDATE: &str = "private-update";
    /// Synthesized by the client on every connection transition.
    pub const CONNECTION_STATUS: &str = "connection-status";
    pub const SUBSCRIPTION_ACK: &str = "subscription-ack";
    pub const SUBSCRIPTION_NACK: &str = "subscription-nack";
}

/// One inbound event as seen by router handlers. Not retained after dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub topic: String,
    pub payload: JsonValue,
    /// Server time in millis since Unix epoch, when the server supplied one.
    #[serde(default)]
    pub server_timestamp: Option<i64>,
}

impl EventEnvelope {
    pub fn new(topic: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            topic: topic.into(),
            payload,
            server_timestamp: None,
        }
    }

    pub fn with_server_timestamp(mut self, ts: Option<i64>) -> Self {
        self.server_timestamp = ts;
        self
    }

    /// Deserialize the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
