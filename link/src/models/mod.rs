//! Data models for the atlas-link client library.
//!
//! Defines the wire messages exchanged with the server, the region and
//! mutation payloads routed to handlers, and the status snapshot published on
//! every connection transition.

pub mod bounds;
pub mod client_message;
pub mod connection_options;
pub mod connection_status;
pub mod envelope;
pub mod mutation;
pub mod server_message;
pub mod subscription_info;


pub use bounds::{BoundsKey, RegionBounds};
pub use client_message::ClientMessage;
pub use connection_options::{ConnectionOptions, TransportPreference};
pub use connection_status::{ConnectionState, ConnectionStatus};
pub use envelope::{topics, EventEnvelope};
pub use mutation::{DataUpdate, EntityId, MutationType, PrivateUpdate};
pub use server_message::{ServerMessage, SubscriptionOp};
pub use subscription_info::SubscriptionInfo;
