//! # atlas-link
//!
//! Client library for the Atlas real-time region sync service.
//!
//! A client owns one authenticated WebSocket session at a time, keeps it
//! alive with heartbeats, reconnects with exponential backoff after an
//! unexpected loss and replays the active region subscriptions on every new
//! session. Inbound events are fanned out by topic through an
//! [`EventRouter`]; `data_update` events also flow into a [`DataCache`] via
//! the [`CacheSynchronizer`].
//!
//! ```rust,no_run
//! use atlas_link::{AtlasLinkClient, ConnectionOptions, RegionBounds, topics};
//!
//! # async fn example() -> atlas_link::Result<()> {
//! let client = AtlasLinkClient::builder()
//!     .base_url("https://sync.example.com")
//!     .connection_options(ConnectionOptions::default().with_max_reconnect_attempts(3))
//!     .build()?;
//!
//! client.on(topics::DATA_UPDATE, |event| {
//!     println!("{}", event.payload);
//!     Ok(())
//! });
//! client.subscribe(RegionBounds::new(10.0, 0.0, 10.0, 0.0)).await?;
//! client.connect("token-a").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cache;
pub mod client;
pub mod compression;
pub mod connection;
pub mod error;
pub mod event_router;
pub mod models;
pub mod status;
pub mod subscription;
pub mod timeouts;

pub use auth::{ArcDynAuthProvider, Credential, DynamicAuthProvider, ResolvedAuth};
pub use cache::{CacheKey, CacheSynchronizer, DataCache, InMemoryCache, MutationOutcome};
pub use client::{AtlasLinkClient, AtlasLinkClientBuilder};
pub use connection::{
    CloseCause, ConnectionManager, Connector, Framing, SessionId, Transport, TransportEvent,
    WebSocketConnector,
};
pub use error::{AtlasLinkError, Result};
pub use event_router::{DispatchReport, EventHandler, EventRouter, HandlerId, HandlerRegistration};
pub use models::{
    topics, BoundsKey, ClientMessage, ConnectionOptions, ConnectionState, ConnectionStatus,
    DataUpdate, EntityId, EventEnvelope, MutationType, PrivateUpdate, RegionBounds,
    ServerMessage, SubscriptionInfo, SubscriptionOp, TransportPreference,
};
pub use status::StatusPublisher;
pub use timeouts::{LinkTimeouts, LinkTimeoutsBuilder};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
