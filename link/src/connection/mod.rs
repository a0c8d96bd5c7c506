//! Session lifecycle.
//!
//! - [`manager`]: the [`ConnectionManager`] handle and its background task
//! - [`transport`]: the `Connector` / `Transport` seam
//! - [`websocket`]: the tokio-tungstenite implementation of that seam
//! - [`backoff`], [`timers`]: retry policy and the owned timer set

pub mod backoff;
pub mod manager;
pub mod timers;
pub mod transport;
pub mod websocket;

pub use backoff::Backoff;
pub use manager::{ConnectionManager, SessionId, SERVER_CLOSE_MESSAGE};
pub(crate) use manager::WeakConnectionManager;
pub use timers::{ConnectionTimers, TimerEvent};
pub use transport::{CloseCause, Connector, Framing, Transport, TransportEvent};
pub use websocket::{resolve_ws_url, WebSocketConnector, WebSocketTransport, TRANSPORT_CLOSE};
